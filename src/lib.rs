//! Autograder - 自动评分服务核心
//!
//! 基于 Actix Web 与本地文件存储构建的评分服务器后端。
//!
//! # 架构
//! - `config`: 配置管理
//! - `errors`: 统一错误处理
//! - `middlewares`: 令牌认证与课程角色中间件
//! - `models`: 数据模型定义（标识符、角色、引用、任务等）
//! - `routes`: API 路由层
//! - `runtime`: 运行时生命周期与任务调度
//! - `services`: 业务逻辑层（提交查询、定时任务运行器）
//! - `storage`: 数据存储层（文件系统）
//! - `utils`: 工具函数

pub mod config;
pub mod errors;
pub mod middlewares;
pub mod models;
pub mod routes;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod utils;
