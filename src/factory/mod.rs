//! 限流器工厂模块
//!
//! 根据治理配置创建限流中间件。
//!
//! # 特性
//!
//! - **固定顺序** - filter、delay、rate、parallelism
//! - **提前校验** - 创建前校验整份配置，任何错误都不会留下半成品

use crate::config::GovernanceConfig;
use crate::error::ReqGateError;
use crate::limiters::{
    delay_limiter, filter_limiter, parallelism_limiter, rate_limiter, LimiterMiddleware,
};
use crate::middleware::Middleware;
use std::sync::Arc;
use tracing::info;

/// 限流器工厂
///
/// # 示例
///
/// ```rust
/// use reqgate::config::{FilterConfig, GovernanceConfig};
/// use reqgate::factory::LimiterFactory;
/// use reqgate::limiters::FilterRule;
/// use reqgate::matchers::HostPattern;
///
/// let config = GovernanceConfig {
///     filter: Some(FilterConfig {
///         whitelist: false,
///         rules: vec![FilterRule::deny(HostPattern::glob("*.ads.com"))],
///     }),
///     ..Default::default()
/// };
/// let middlewares = LimiterFactory::from_config(&config).unwrap();
/// assert_eq!(middlewares.len(), 1);
/// ```
pub struct LimiterFactory;

impl LimiterFactory {
    /// 从配置创建中间件（按安装顺序）
    ///
    /// 配置了速率规则时必须在 tokio 运行时中调用。
    ///
    /// # 返回
    /// - `Ok(Vec<Arc<dyn Middleware>>)`: 中间件列表，可直接注册到客户端
    /// - `Err(ReqGateError::ConfigError)`: 配置无效
    pub fn from_config(
        config: &GovernanceConfig,
    ) -> Result<Vec<Arc<dyn Middleware>>, ReqGateError> {
        Ok(Self::build(config)?
            .into_iter()
            .map(|limiter| limiter as Arc<dyn Middleware>)
            .collect())
    }

    /// 从配置创建限流中间件，保留具体类型以便读取统计和淘汰状态
    pub fn build(config: &GovernanceConfig) -> Result<Vec<Arc<LimiterMiddleware>>, ReqGateError> {
        config.validate().map_err(ReqGateError::ConfigError)?;

        let mut limiters = Vec::new();

        if let Some(filter) = &config.filter {
            limiters.push(Arc::new(filter_limiter(
                filter.whitelist,
                filter.rules.clone(),
            )?));
        }
        if let Some(delay) = &config.delay {
            limiters.push(Arc::new(delay_limiter(delay.scope, delay.rules.clone())?));
        }
        if let Some(rate) = &config.rate {
            limiters.push(Arc::new(rate_limiter(rate.scope, rate.rules.clone())?));
        }
        if let Some(parallelism) = &config.parallelism {
            limiters.push(Arc::new(parallelism_limiter(
                parallelism.scope,
                parallelism.rules.clone(),
            )?));
        }

        info!("Created {} limiter middlewares from config", limiters.len());
        Ok(limiters)
    }
}
