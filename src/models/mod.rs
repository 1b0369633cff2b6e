pub mod request;
pub mod session;
pub mod thread;

pub use request::*;
pub use session::*;
pub use thread::*;
