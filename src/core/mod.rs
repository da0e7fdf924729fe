// Detection and merge logic, plus shared errors/models
pub mod grouping {
    pub use crate::grouping::*;
}

pub mod merge {
    pub use crate::merge::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
