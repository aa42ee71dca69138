//! Placeholder documents for the idle and loading screens.
//!
//! Both are tiny Vega-Lite specs that draw a single line of text. The
//! loading placeholder exists so that a slow document never leaves the
//! previous chart on screen while the new one is on its way.

use serde_json::json;

use crate::document::Document;

/// The two non-user documents the server ever shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Shown once a browser connects and nothing has been plotted yet.
    Ready,
    /// Shown between a `plot` call and the arrival of its document.
    Loading,
}

impl Placeholder {
    pub fn text(self) -> &'static str {
        match self {
            Self::Ready => "Ready: waiting for a plot",
            Self::Loading => "Loading...",
        }
    }

    pub fn document(self) -> Document {
        Document::new(json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "description": format!("pushviz {} placeholder", self.as_str()),
            "data": { "values": [ { "text": self.text() } ] },
            "mark": { "type": "text", "fontSize": 18 },
            "encoding": { "text": { "field": "text", "type": "nominal" } },
            "width": 400,
            "height": 60,
        }))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Loading => "loading",
        }
    }

    /// Recognise a decoded document as one of the placeholders.
    pub fn identify(doc: &Document) -> Option<Self> {
        [Self::Ready, Self::Loading]
            .into_iter()
            .find(|p| p.document() == *doc)
    }
}
