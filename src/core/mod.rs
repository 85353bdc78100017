pub mod completion;
pub mod translate;
pub mod vendor;

pub use completion::{CompletionBackend, CompletionError, EchoCompletion, HttpCompletion};
pub use vendor::{VendorConfig, VendorCredentials, VendorError, VendorTaskManager};
