//! IaC Validator
//!
//! Terraform / Bicep 校验、模板生成与资源说明，通过 MCP stdio 服务
//! 和 HTTP Skill 服务两种前端暴露。

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod http;
pub mod mcp;
pub mod registry;
pub mod render;
pub mod scanner;
pub mod tools;
