pub mod client;
pub mod commit;
pub mod error;
mod queries;
pub mod types;

pub use client::{normalize_shop_domain, AdminClient, AdminConnector};
pub use commit::{commit_product, description_html, CommitOutcome, CommitRequest};
pub use error::ShopifyError;
pub use types::{
    join_user_errors, ActiveSubscription, CreatedProduct, CreatedSubscription,
    SubscriptionRequest, UserError,
};
