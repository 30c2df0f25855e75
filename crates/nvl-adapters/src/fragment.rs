//! `scraper`-backed implementation of the match-card contract.

use scraper::{ElementRef, Html, Node, Selector};

use crate::extract::ExtractError;
use crate::{InlineNode, MatchFragment, MATCH_CARD_SELECTOR};

pub fn parse_page(html: &str) -> Html {
    Html::parse_document(html)
}

/// Match cards in document order.
pub fn match_cards(document: &Html) -> Result<Vec<ElementRef<'_>>, ExtractError> {
    let selector =
        Selector::parse(MATCH_CARD_SELECTOR).map_err(|e| ExtractError::Selector(e.to_string()))?;
    Ok(document.select(&selector).collect())
}

impl MatchFragment for ElementRef<'_> {
    fn attr(&self, name: &str) -> Option<String> {
        self.value().attr(name).map(str::to_string)
    }

    fn find_all(&self, tag: &str) -> Vec<InlineNode> {
        let Ok(selector) = Selector::parse(tag) else {
            return Vec::new();
        };
        self.select(&selector).map(inline_node).collect()
    }
}

fn inline_node(element: ElementRef<'_>) -> InlineNode {
    let mut segments = vec![String::new()];
    let mut has_line_break = false;
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                if let Some(current) = segments.last_mut() {
                    current.push_str(text);
                }
            }
            Node::Element(el) if el.name() == "br" => {
                has_line_break = true;
                segments.push(String::new());
            }
            Node::Element(_) => {
                if let (Some(nested), Some(current)) = (ElementRef::wrap(child), segments.last_mut())
                {
                    current.extend(nested.text());
                }
            }
            _ => {}
        }
    }

    InlineNode {
        text: element.text().collect(),
        segments: segments
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        has_attributes: element.value().attrs().next().is_some(),
        has_line_break,
    }
}
