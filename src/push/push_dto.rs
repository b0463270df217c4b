use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::push_models::SubscriptionKeys;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubscribeRequest {
    #[validate(url)]
    pub endpoint: String,
    #[validate(nested)]
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UnsubscribeRequest {
    #[validate(length(min = 1))]
    pub endpoint: String,
}
