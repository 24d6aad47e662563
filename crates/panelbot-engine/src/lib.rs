pub mod compose;
pub mod error;
pub mod http;
pub mod normalize;
pub mod providers;
pub mod retry;
pub mod storage;

pub use error::{EngineError, EngineResult};
pub use http::{
    run_attempt, AttemptResult, FormPart, FormValue, HttpReply, HttpTransport, RequestBody,
    RequestSpec, Transport,
};
pub use normalize::{
    decode_inline_image, extract_from_document, extract_image, Downloader, ImageBytes,
    ShapeMatcher, TransportDownloader, SHAPE_MATCHERS,
};
pub use retry::{
    outputs_match, FailureClassifier, RetryClass, RetryController, RetryPolicy, Sleeper,
    ThreadSleeper,
};
pub use storage::{ObjectStore, TosConfig, TosStorage};
