//! 能力注册表
//!
//! stdio 与 HTTP 两个前端共用。启动时一次性注册，之后只读。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ToolError;

// ============================================================================
// 描述符
// ============================================================================

/// 参数的基本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Boolean,
    Integer,
    Number,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    /// 额外容忍的类型，不出现在 schema 里
    #[serde(skip)]
    pub also_accepts: Vec<ParamType>,
}

impl Property {
    fn accepts(&self, value: &Value) -> bool {
        self.kind.matches(value) || self.also_accepts.iter().any(|k| k.matches(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// 能力描述，原样暴露给 `tools/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::default(),
        }
    }

    pub fn param(
        mut self,
        name: &str,
        kind: ParamType,
        description: &str,
        required: bool,
    ) -> Self {
        self.input_schema.properties.insert(
            name.to_string(),
            Property {
                kind,
                description: description.to_string(),
                allowed: Vec::new(),
                also_accepts: Vec::new(),
            },
        );
        if required {
            self.input_schema.required.push(name.to_string());
        }
        self
    }

    /// 为已声明的参数限定取值
    pub fn allowed(mut self, name: &str, values: &[&str]) -> Self {
        if let Some(prop) = self.input_schema.properties.get_mut(name) {
            prop.allowed = values.iter().map(|v| v.to_string()).collect();
        }
        self
    }

    /// 已声明的参数额外接受另一种类型
    pub fn accepts(mut self, name: &str, kind: ParamType) -> Self {
        if let Some(prop) = self.input_schema.properties.get_mut(name) {
            prop.also_accepts.push(kind);
        }
        self
    }

    /// 校验参数：必填项存在；出现的已声明参数类型正确；带枚举的字符串参数取值合法
    ///
    /// 值为 `null` 的参数视同缺省。
    pub fn validate_args(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        let schema = &self.input_schema;

        for name in &schema.required {
            if matches!(args.get(name), None | Some(Value::Null)) {
                return Err(ToolError::missing(name));
            }
        }

        for (name, prop) in &schema.properties {
            let value = match args.get(name) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };
            if !prop.accepts(value) {
                return Err(ToolError::invalid(
                    name,
                    format!("expected {}", prop.kind.as_str()),
                ));
            }
            if prop.allowed.is_empty() {
                continue;
            }
            if let Value::String(value) = value {
                if !prop.allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
                    return Err(ToolError::invalid(
                        name,
                        format!("'{}' is not one of: {}", value, prop.allowed.join(", ")),
                    ));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// 调用结果
// ============================================================================

/// 内容块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// 能力调用结果（MCP `tools/call` 的 result）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    /// 强类型结果的 JSON 形式，供 HTTP 前端直接返回；不进入 MCP 输出
    #[serde(skip)]
    pub structured: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
            structured: None,
        }
    }

    /// 业务失败：仍是正常 result，只是带 isError
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: true,
            structured: None,
        }
    }

    pub fn flagged(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }

    pub fn with_structured<T: Serialize>(mut self, value: &T) -> Self {
        self.structured = serde_json::to_value(value).ok();
        self
    }

    /// 所有文本块拼接
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|ContentBlock::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// 注册表
// ============================================================================

#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// 参数已按描述符校验过
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError>;
}

struct Entry {
    descriptor: CapabilityDescriptor,
    handler: Arc<dyn CapabilityHandler>,
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加注册；名称重复报错
    pub fn register(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), ToolError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(ToolError::DuplicateCapability(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry { descriptor, handler });
        Ok(())
    }

    /// 按注册顺序返回描述符
    pub fn descriptors(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn descriptor(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i].descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn dispatch(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<ToolOutput, ToolError> {
        let entry = self
            .index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ToolError::UnknownCapability(name.to_string()))?;

        entry.descriptor.validate_args(&args)?;
        debug!(capability = name, "dispatching");
        entry.handler.call(args).await
    }
}
