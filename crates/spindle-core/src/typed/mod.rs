//! Typed - 型付き Task API
//!
//! handler 名の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Params` / `Task` trait, `Handler<T>` trait, `Process<P>` - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod process;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::process::Process;
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::{Params, Task};
