// 服务层模块
//
// - mcp: MCP 工具配置解析、安装记录与环境清理
// - model: 本地推理模型能力识别与就绪协调

pub mod mcp;
pub mod model;

pub use mcp::{ConfigResolver, InstallationManager};
pub use model::{classify, OllamaHost, ReadinessCoordinator, ReadinessStream};
