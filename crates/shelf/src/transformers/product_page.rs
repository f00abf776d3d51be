//! CSS-selector rules for product detail pages of the HTML catalog.
//!
//! Each output field is one [`PageRule`]; the rules compose through the same
//! [`RuleSet`] as the JSON rules, so the completeness and duplicate-key
//! guarantees are shared. Missing elements resolve to `null` (or `false` for
//! presence checks), never to an error.

use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};

use shelf_core::error::ExtractionError;
use shelf_core::extract::to_float;
use shelf_core::models::{FlatRecord, RawRecord};
use shelf_core::transform::{Rule, RuleSet, Transformer};

pub const NAME: &str = "product_page";

/// Image attributes in size order.
const IMAGE_ATTRS: [(&str, &str); 3] = [
    ("src", "size_1"),
    ("data-main1", "size_2"),
    ("data-main2", "size_3"),
];

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Malformed {
        key: css.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub enum PageRuleKind {
    /// Trimmed own text of the first match.
    Text(Selector),
    /// Whether anything matches.
    Exists(Selector),
    /// Float parsed from an attribute of the first match.
    AttrFloat { selector: Selector, attr: String },
    /// One size map per gallery node, or the main photo when the gallery is
    /// empty.
    Images { gallery: Selector, main: Selector },
    /// `[{label, value}]` from the items of the first container.
    LabeledList {
        container: Selector,
        item: Selector,
        label: Selector,
        value: Selector,
        value_fallback: Selector,
    },
    /// `[{label, value}]` from headed content blocks. Paragraphs and list
    /// items are joined with newlines, list items tab-indented.
    Sections {
        block: Selector,
        heading: Selector,
        parts: Selector,
        list_item: Selector,
    },
}

#[derive(Debug, Clone)]
pub struct PageRule {
    pub output_key: String,
    pub kind: PageRuleKind,
}

impl PageRule {
    fn new(output_key: &str, kind: PageRuleKind) -> Self {
        Self {
            output_key: output_key.to_string(),
            kind,
        }
    }
}

impl Rule for PageRule {
    type Input = Html;

    fn output_key(&self) -> &str {
        &self.output_key
    }

    fn evaluate(&self, doc: &Html) -> Result<Value, ExtractionError> {
        match &self.kind {
            PageRuleKind::Text(sel) => Ok(doc
                .select(sel)
                .next()
                .and_then(own_text)
                .map(Value::String)
                .unwrap_or(Value::Null)),
            PageRuleKind::Exists(sel) => Ok(Value::Bool(doc.select(sel).next().is_some())),
            PageRuleKind::AttrFloat { selector, attr } => {
                let raw = doc
                    .select(selector)
                    .next()
                    .and_then(|el| el.value().attr(attr))
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null);
                to_float(&self.output_key, &raw)
            }
            PageRuleKind::Images { gallery, main } => {
                let mut groups: Vec<Value> = doc.select(gallery).map(image_sizes).collect();
                if groups.is_empty() {
                    groups.extend(doc.select(main).next().map(image_sizes));
                }
                Ok(Value::Array(groups))
            }
            PageRuleKind::LabeledList {
                container,
                item,
                label,
                value,
                value_fallback,
            } => {
                let Some(list) = doc.select(container).next() else {
                    return Ok(Value::Null);
                };
                let entries = list
                    .select(item)
                    .map(|li| {
                        let text_of = |sel: &Selector| li.select(sel).next().and_then(own_text);
                        let value = text_of(value).or_else(|| text_of(value_fallback));
                        json!({ "label": text_of(label), "value": value })
                    })
                    .collect();
                Ok(Value::Array(entries))
            }
            PageRuleKind::Sections {
                block,
                heading,
                parts,
                list_item,
            } => {
                let sections = doc
                    .select(block)
                    .filter_map(|div| {
                        let title = div.select(heading).next().and_then(first_text)?;
                        let body = div
                            .select(parts)
                            .map(|part| part_text(part, list_item))
                            .filter(|s| !s.is_empty())
                            .collect::<Vec<_>>()
                            .join("\n");
                        Some(json!({ "label": title, "value": body }))
                    })
                    .collect();
                Ok(Value::Array(sections))
            }
        }
    }
}

/// Direct text children, trimmed; `None` when blank.
fn own_text(el: ElementRef<'_>) -> Option<String> {
    let text: String = el
        .children()
        .filter_map(|node| node.value().as_text().map(|t| &**t))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// First descendant text node, trimmed.
fn first_text(el: ElementRef<'_>) -> Option<String> {
    el.text().next().map(|t| t.trim().to_string())
}

fn part_text(part: ElementRef<'_>, list_item: &Selector) -> String {
    if part.value().name() == "p" {
        return first_text(part).unwrap_or_default();
    }
    let items: Vec<String> = part
        .select(list_item)
        .map(|li| first_text(li).unwrap_or_default().replace('\n', " "))
        .collect();
    format!("\t{}", items.join("\n\t"))
}

fn image_sizes(el: ElementRef<'_>) -> Value {
    let mut sizes = Map::new();
    for (attr, key) in IMAGE_ATTRS {
        if let Some(url) = el.value().attr(attr) {
            sizes.insert(key.to_string(), Value::String(url.to_string()));
        }
    }
    Value::Object(sizes)
}

/// Transformer over fetched product pages.
#[derive(Debug, Clone)]
pub struct ProductPageTransformer {
    rules: RuleSet<PageRule>,
}

impl ProductPageTransformer {
    pub fn new() -> Result<Self, ExtractionError> {
        let rules = vec![
            PageRule::new("title", PageRuleKind::Text(selector(".product-title h1")?)),
            PageRule::new("is_receipt", PageRuleKind::Exists(selector(".item-recipe-line")?)),
            PageRule::new(
                "price",
                PageRuleKind::AttrFloat {
                    selector: selector("link[itemprop=price]")?,
                    attr: "content".to_string(),
                },
            ),
            PageRule::new(
                "images",
                PageRuleKind::Images {
                    gallery: selector(".js-photos-item-zoom")?,
                    main: selector(".js-main-item-photo")?,
                },
            ),
            PageRule::new(
                "info",
                PageRuleKind::LabeledList {
                    container: selector(".infos")?,
                    item: selector("li")?,
                    label: selector(".param")?,
                    value: selector(".param-text")?,
                    value_fallback: selector(".param-text a")?,
                },
            ),
            PageRule::new(
                "instructions",
                PageRuleKind::Sections {
                    block: selector("div.product-information__info__content__block")?,
                    heading: selector("h3")?,
                    parts: selector("p, ul")?,
                    list_item: selector("li")?,
                },
            ),
        ];
        Ok(Self {
            rules: RuleSet::new(rules)?,
        })
    }
}

impl Transformer for ProductPageTransformer {
    fn name(&self) -> &str {
        NAME
    }

    fn output_keys(&self) -> Vec<String> {
        self.rules.output_keys()
    }

    fn transform(&self, raw: &RawRecord) -> Result<FlatRecord, ExtractionError> {
        match raw {
            RawRecord::Document { html, .. } => self.rules.apply(&Html::parse_document(html)),
            other => Err(ExtractionError::WrongShape {
                transformer: NAME.to_string(),
                found: other.kind(),
            }),
        }
    }
}
