//! External service integrations.

pub mod stripe_client {
    pub use crate::stripe_client::*;
}

pub mod dwolla_client {
    pub use crate::dwolla_client::*;
}

pub mod email_client {
    pub use crate::email_client::*;
}

pub mod identity_client {
    pub use crate::identity_client::*;
}

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
