//! Concrete transformers, one per source type.
//!
//! | Source kind | Transformer | Reads |
//! |-------------|-------------|-------|
//! | `graphql` | [`product_api`] | product-detail JSON items |
//! | `html` | [`product_page`] | fetched product pages |

pub mod product_api;
pub mod product_page;

use shelf_core::error::ExtractionError;
use shelf_core::transform::Transformer;

use crate::config::SourceKind;

pub use product_api::product_api_transformer;
pub use product_page::ProductPageTransformer;

/// The transformer for records of the given source kind.
pub fn for_source(kind: SourceKind) -> Result<Box<dyn Transformer>, ExtractionError> {
    Ok(match kind {
        SourceKind::Graphql => Box::new(product_api_transformer()?),
        SourceKind::Html => Box::new(ProductPageTransformer::new()?),
    })
}
