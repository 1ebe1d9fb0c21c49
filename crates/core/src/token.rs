//! Per-page token layer
//!
//! Holds the word tokens produced by the external layout-extraction pipeline,
//! aligned to document space (scale 1.0, origin at the page's top-left).
//! Enables token lookup, selection by rectangle, raw-text reconstruction and
//! text search.

use crate::bounds::{union_of, DocBox};
use crate::error::{CoreError, CoreResult};

/// Token id: the token's index within its page
pub type TokenId = u32;

/// A single extracted word with its rectangle in document space
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    /// Word text, empty when the layer carries geometry only
    #[serde(default)]
    pub text: String,
}

impl Token {
    pub fn new(id: TokenId, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { id, x, y, width, height, text: String::new() }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn bounds(&self) -> DocBox {
        DocBox::from_origin_size(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Token-loader payload for one page
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageTokens {
    pub page: u32,
    pub tokens: Vec<Token>,
}

/// Whether a page's token layer could be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TokenLayerStatus {
    Available,
    /// Degraded mode: the page only supports freeform annotation
    Unavailable,
}

/// What a finished drag on one page resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct PageSelection {
    pub page: u32,
    /// Covered tokens, ascending; always empty when the layer is unavailable
    pub token_ids: Vec<TokenId>,
    /// The normalized drag rectangle in document space
    pub doc_box: DocBox,
    pub layer: TokenLayerStatus,
}

/// A phrase match found by [`TokenIndex::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMatch {
    pub page: u32,
    pub token_ids: Vec<TokenId>,
    pub bounds: DocBox,
}

/// Immutable token layer for one page
#[derive(Debug, Clone)]
pub struct TokenIndex {
    page: u32,
    /// Sorted by token id
    tokens: Vec<Token>,
}

impl TokenIndex {
    /// Build the index for `page`; an empty payload yields an unavailable layer
    pub fn new(page: u32, mut tokens: Vec<Token>) -> Self {
        tokens.sort_by_key(|t| t.id);
        tokens.dedup_by_key(|t| t.id);

        if tokens.is_empty() {
            tracing::warn!(page, "token layer unavailable; page limited to freeform annotation");
        }

        Self { page, tokens }
    }

    /// Index for a page whose token layer failed to load
    pub fn unavailable(page: u32) -> Self {
        Self::new(page, Vec::new())
    }

    pub fn from_page_tokens(payload: PageTokens) -> Self {
        Self::new(payload.page, payload.tokens)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn status(&self) -> TokenLayerStatus {
        if self.tokens.is_empty() {
            TokenLayerStatus::Unavailable
        } else {
            TokenLayerStatus::Available
        }
    }

    pub fn is_available(&self) -> bool {
        self.status() == TokenLayerStatus::Available
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get_token(&self, id: TokenId) -> CoreResult<&Token> {
        self.tokens
            .binary_search_by_key(&id, |t| t.id)
            .map(|pos| &self.tokens[pos])
            .map_err(|_| CoreError::not_found("token", id))
    }

    /// Ids of every token whose center lies inside `doc_box`, ascending
    ///
    /// `doc_box` must already be normalized.
    pub fn tokens_in_box(&self, doc_box: &DocBox) -> Vec<TokenId> {
        self.tokens.iter().filter(|t| doc_box.contains_token(t)).map(|t| t.id).collect()
    }

    /// Normalize `doc_box` and collect the tokens it covers
    pub fn resolve(&self, doc_box: &DocBox) -> PageSelection {
        let doc_box = doc_box.normalize();
        PageSelection {
            page: self.page,
            token_ids: self.tokens_in_box(&doc_box),
            doc_box,
            layer: self.status(),
        }
    }

    /// Minimal document-space box around the given tokens
    pub fn bounds_of(&self, ids: &[TokenId]) -> CoreResult<DocBox> {
        let boxes = ids
            .iter()
            .map(|id| self.get_token(*id).map(Token::bounds))
            .collect::<CoreResult<Vec<_>>>()?;
        union_of(&boxes)
    }

    /// Text of the given tokens in reading (ascending id) order
    ///
    /// Unknown ids are skipped.
    pub fn text_of(&self, ids: &[TokenId]) -> String {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        ids.iter()
            .filter_map(|id| self.get_token(*id).ok())
            .map(|t| t.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Find phrase matches across consecutive tokens
    ///
    /// The query is split on whitespace and every word must equal the text of
    /// one token in sequence. Matches do not overlap.
    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<TokenMatch> {
        let fold = |s: &str| if case_sensitive { s.to_string() } else { s.to_lowercase() };
        let words: Vec<String> = query.split_whitespace().map(fold).collect();

        if words.is_empty() || words.len() > self.tokens.len() {
            return Vec::new();
        }

        let texts: Vec<String> = self.tokens.iter().map(|t| fold(t.text.trim())).collect();
        let mut matches = Vec::new();
        let mut start = 0;

        while start + words.len() <= texts.len() {
            let window = &texts[start..start + words.len()];
            if window.iter().zip(&words).all(|(text, word)| text == word) {
                let hit = &self.tokens[start..start + words.len()];
                let token_ids: Vec<TokenId> = hit.iter().map(|t| t.id).collect();
                let boxes: Vec<DocBox> = hit.iter().map(Token::bounds).collect();

                if let Ok(bounds) = union_of(&boxes) {
                    matches.push(TokenMatch { page: self.page, token_ids, bounds });
                }
                start += words.len();
            } else {
                start += 1;
            }
        }

        matches
    }
}
