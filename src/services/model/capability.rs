//! 模型工具调用能力识别
//!
//! 匹配表与诊断用的模式列表共用同一张有序表，首个匹配生效。

use crate::models::{CapabilityDescriptor, ToolCallFormat};

/// 一条能力匹配规则（模式为小写前缀）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityPattern {
    pub pattern: &'static str,
    pub family: &'static str,
    pub format: ToolCallFormat,
}

const fn rule(pattern: &'static str, family: &'static str, format: ToolCallFormat) -> CapabilityPattern {
    CapabilityPattern {
        pattern,
        family,
        format,
    }
}

/// 已知支持原生工具调用的模型家族，更具体的前缀放在前面
pub const NATIVE_TOOL_PATTERNS: &[CapabilityPattern] = &[
    rule("llama3.1", "llama", ToolCallFormat::OpenAiFunctions),
    rule("llama3.2", "llama", ToolCallFormat::OpenAiFunctions),
    rule("llama3.3", "llama", ToolCallFormat::OpenAiFunctions),
    rule("llama4", "llama", ToolCallFormat::OpenAiFunctions),
    rule("qwen2.5", "qwen", ToolCallFormat::Hermes),
    rule("qwen3", "qwen", ToolCallFormat::Hermes),
    rule("qwen2", "qwen", ToolCallFormat::Hermes),
    rule("qwq", "qwen", ToolCallFormat::Hermes),
    rule("hermes3", "hermes", ToolCallFormat::Hermes),
    rule("mistral-nemo", "mistral", ToolCallFormat::Mistral),
    rule("mistral-small", "mistral", ToolCallFormat::Mistral),
    rule("mistral-large", "mistral", ToolCallFormat::Mistral),
    rule("mistral", "mistral", ToolCallFormat::Mistral),
    rule("mixtral", "mistral", ToolCallFormat::Mistral),
    rule("command-r", "command-r", ToolCallFormat::OpenAiFunctions),
    rule("firefunction", "firefunction", ToolCallFormat::OpenAiFunctions),
    rule("granite3", "granite", ToolCallFormat::OpenAiFunctions),
    rule("nemotron", "nemotron", ToolCallFormat::OpenAiFunctions),
    rule("smollm2", "smollm", ToolCallFormat::OpenAiFunctions),
    rule("gpt-oss", "gpt-oss", ToolCallFormat::OpenAiFunctions),
];

/// 识别模型能力，纯函数，不会失败
///
/// 同时尝试完整名称和最后一段路径（`hf.co/org/Qwen2.5-7B` → `qwen2.5-7b`）。
pub fn classify(model: &str) -> CapabilityDescriptor {
    let normalized = model.trim().to_lowercase();
    let base = normalized.rsplit('/').next().unwrap_or(&normalized);

    let matched = NATIVE_TOOL_PATTERNS
        .iter()
        .find(|p| normalized.starts_with(p.pattern) || base.starts_with(p.pattern));

    match matched {
        Some(p) => CapabilityDescriptor {
            model: model.to_string(),
            supports_native_tools: true,
            requires_prompt_engineering: false,
            tool_call_format: Some(p.format),
            family: Some(p.family.to_string()),
        },
        None => CapabilityDescriptor {
            model: model.to_string(),
            supports_native_tools: false,
            requires_prompt_engineering: true,
            tool_call_format: None,
            family: None,
        },
    }
}
