//! Data access layer.

pub mod store {
    pub use crate::store::*;
}

pub mod db {
    pub use crate::db::*;
}
