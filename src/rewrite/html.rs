//! Streaming element rewriting.
//!
//! Each `(selector, rule)` pair in [`RULES`] becomes one `lol_html` element
//! handler. Handlers run independently as the parser meets matching start
//! tags; nothing is buffered beyond what the tokenizer needs.

use std::borrow::Cow;
use std::error::Error;

use bytes::Bytes;
use lol_html::html_content::Element;
use lol_html::{ElementContentHandlers, HtmlRewriter, Selector, Settings};

use crate::rewrite::RewriteError;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// What to do with an element matched by a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRule {
    /// `<meta name="csp-nonce">`: expose the nonce to client-side code.
    PublishNonce,
    /// `<meta http-equiv="Content-Security-Policy">`: drop it, the header wins.
    DropMetaPolicy,
    /// Inline `<script>` without a nonce.
    NonceInlineScript,
    /// `<style>` without a nonce.
    NonceStyle,
}

/// Selector dispatch table, evaluated in a single pass.
pub const RULES: &[(&str, ElementRule)] = &[
    (r#"meta[name="csp-nonce"]"#, ElementRule::PublishNonce),
    ("meta[http-equiv]", ElementRule::DropMetaPolicy),
    ("script", ElementRule::NonceInlineScript),
    ("style", ElementRule::NonceStyle),
];

impl ElementRule {
    pub fn apply(self, el: &mut Element<'_, '_>, nonce: &str) -> HandlerResult {
        match self {
            ElementRule::PublishNonce => {
                el.set_attribute("content", nonce)?;
            }
            ElementRule::DropMetaPolicy => {
                // http-equiv values are case-insensitive
                let is_policy = el
                    .get_attribute("http-equiv")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-security-policy"));
                if is_policy {
                    el.remove();
                }
            }
            ElementRule::NonceInlineScript => {
                if !el.has_attribute("nonce") && !el.has_attribute("src") {
                    el.set_attribute("nonce", nonce)?;
                }
            }
            ElementRule::NonceStyle => {
                if !el.has_attribute("nonce") {
                    el.set_attribute("nonce", nonce)?;
                }
            }
        }
        Ok(())
    }
}

/// Build rewriter settings with one handler per entry in [`RULES`].
pub fn settings(nonce: &str) -> Result<Settings<'_, 'static>, RewriteError> {
    let mut handlers = Vec::with_capacity(RULES.len());
    for &(selector, rule) in RULES {
        let selector: Selector = selector.parse()?;
        let handler = ElementContentHandlers::default()
            .element(move |el: &mut Element<'_, '_>| rule.apply(el, nonce));
        handlers.push((Cow::Owned(selector), handler));
    }

    Ok(Settings {
        element_content_handlers: handlers,
        // Parser ambiguities are passed through instead of failing the body.
        strict: false,
        ..Settings::default()
    })
}

/// Rewrite `chunks` as one document, handing output to `sink` as soon as
/// the parser releases it.
///
/// Stops at the first chunk error. An exhausted iterator ends the document.
pub fn rewrite_stream<I, S>(chunks: I, nonce: &str, mut sink: S) -> Result<(), RewriteError>
where
    I: IntoIterator<Item = Result<Bytes, RewriteError>>,
    S: FnMut(&[u8]),
{
    let mut rewriter = HtmlRewriter::new(settings(nonce)?, |out: &[u8]| {
        if !out.is_empty() {
            sink(out)
        }
    });
    for chunk in chunks {
        rewriter.write(&chunk?)?;
    }
    rewriter.end()?;
    Ok(())
}
