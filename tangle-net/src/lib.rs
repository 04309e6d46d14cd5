pub mod error;
pub mod fetcher;
pub mod json_source;
pub mod pager;
pub mod source;

pub use error::FetchError;
pub use fetcher::{Credentials, HttpFetcher, StatusCheck};
pub use json_source::{EndpointConfig, JsonRelationSource};
pub use pager::PageEnumerator;
pub use source::{
    AttributeBag, AttributeSpec, AttributeType, Direction, RelatedItem, RelatedPage,
    RelationSource, SourceSchema,
};
