//! # PACS Core
//!
//! 影像接收系统的核心模块，提供检查标识、生命周期状态、错误定义、时钟抽象和通用工具。

pub mod clock;
pub mod error;
pub mod models;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PacsError, Result};
pub use models::*;
