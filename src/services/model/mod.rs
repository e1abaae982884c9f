// 本地推理模型服务模块
//
// 工具调用能力识别、模型宿主（Ollama）与就绪协调

pub mod capability;
pub mod host;
pub mod ollama;
pub mod progress;
pub mod readiness;

pub use capability::{classify, CapabilityPattern, NATIVE_TOOL_PATTERNS};
pub use host::{
    progress_channel, ModelHost, ProgressSender, ProgressSubscription, DOWNLOAD_PROGRESS_EVENT,
};
pub use ollama::OllamaHost;
pub use progress::{format_bytes, format_speed, interpret, ProgressTracker, ProgressUpdate};
pub use readiness::{ReadinessCoordinator, ReadinessStream};
