// Domain-layer workflows and shared errors/models
pub mod booking {
    pub use crate::booking::*;
}

pub mod payments {
    pub use crate::payments::*;
}

pub mod ach {
    pub use crate::ach::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
