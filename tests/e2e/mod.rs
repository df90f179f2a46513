//! 端到端测试模块
//!
//! 测试完整的治理场景

mod governed_crawl;
mod rate_window;
