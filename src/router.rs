// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径模式路由
//!
//! 形如 `/users/{id}/posts/{post_id}` 的模式，每个 `{name}` 匹配一个不含 `/` 的
//! 路径段。路由按注册顺序尝试，第一个匹配的获胜；命中后段值经百分号解码写入
//! 请求的路径参数。

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::{
    exception::Exception,
    handler::RequestHandler,
    logging::LogHandle,
    util::percent_decode,
};

lazy_static! {
    static ref PARAM: Regex = Regex::new(r"\{([^{}/]*)\}").unwrap();
}

struct Route {
    pattern: String,
    regex: Regex,
    param_names: Vec<String>,
    handler: Arc<dyn RequestHandler>,
}

/// 一次成功匹配：处理器与按模式顺序排列的参数。
pub struct RouteMatch {
    pub handler: Arc<dyn RequestHandler>,
    pub params: Vec<(String, String)>,
}

pub struct Router {
    routes: RwLock<Vec<Route>>,
    log: LogHandle,
}

impl Router {
    pub fn new(log: LogHandle) -> Self {
        Self {
            routes: RwLock::new(vec![]),
            log,
        }
    }

    /// 注册路由。相同模式重复注册时在原位置替换处理器。
    pub fn add_route(
        &self,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), Exception> {
        let (regex, param_names) = compile(pattern)?;
        debug!(
            target: self.log.target(),
            "注册路由 {}，参数 {:?}",
            pattern,
            param_names
        );
        let route = Route {
            pattern: pattern.to_string(),
            regex,
            param_names,
            handler,
        };
        let mut routes = self.write_routes();
        match routes.iter().position(|r| r.pattern == pattern) {
            Some(index) => routes[index] = route,
            None => routes.push(route),
        }
        Ok(())
    }

    /// 删除路由，返回是否存在。
    pub fn remove_route(&self, pattern: &str) -> bool {
        let mut routes = self.write_routes();
        let before = routes.len();
        routes.retain(|r| r.pattern != pattern);
        routes.len() != before
    }

    /// 按注册顺序列出模式
    pub fn list_routes(&self) -> Vec<String> {
        self.read_routes().iter().map(|r| r.pattern.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.read_routes().is_empty()
    }

    pub fn match_route(&self, path: &str) -> Option<RouteMatch> {
        let routes = self.read_routes();
        routes.iter().find_map(|route| {
            let captures = route.regex.captures(path)?;
            let params = route
                .param_names
                .iter()
                .zip(captures.iter().skip(1))
                .filter_map(|(name, value)| {
                    let raw = value?.as_str();
                    let decoded = percent_decode(raw).unwrap_or_else(|| raw.to_string());
                    Some((name.clone(), decoded))
                })
                .collect();
            Some(RouteMatch {
                handler: Arc::clone(&route.handler),
                params,
            })
        })
    }

    fn read_routes(&self) -> RwLockReadGuard<'_, Vec<Route>> {
        match self.routes.read() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!(target: self.log.target(), "路由表锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    fn write_routes(&self) -> RwLockWriteGuard<'_, Vec<Route>> {
        match self.routes.write() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!(target: self.log.target(), "路由表锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }
}

/// 模式中是否带有 `{name}` 参数
pub fn is_route_pattern(pattern: &str) -> bool {
    PARAM.is_match(pattern)
}

pub fn extract_param_names(pattern: &str) -> Vec<String> {
    PARAM
        .captures_iter(pattern)
        .map(|c| c[1].to_string())
        .collect()
}

// 字面部分转义，参数替换为单段捕获组，整体锚定
fn compile(pattern: &str) -> Result<(Regex, Vec<String>), Exception> {
    let invalid = |reason: &str| Exception::InvalidRoute(format!("{}: {}", pattern, reason));
    if !pattern.starts_with('/') {
        return Err(invalid("pattern must start with '/'"));
    }
    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut last = 0;
    for captures in PARAM.captures_iter(pattern) {
        let (whole, name) = match (captures.get(0), captures.get(1)) {
            (Some(whole), Some(name)) => (whole, name.as_str()),
            _ => continue,
        };
        if name.is_empty() {
            return Err(invalid("empty parameter name"));
        }
        if !seen.insert(name) {
            return Err(invalid("duplicate parameter name"));
        }
        let literal = &pattern[last..whole.start()];
        if has_brace(literal) {
            return Err(invalid("unbalanced braces"));
        }
        source.push_str(&regex::escape(literal));
        source.push_str("([^/]+)");
        names.push(name.to_string());
        last = whole.end();
    }
    let tail = &pattern[last..];
    if has_brace(tail) {
        return Err(invalid("unbalanced braces"));
    }
    source.push_str(&regex::escape(tail));
    source.push('$');
    let regex = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;
    Ok((regex, names))
}

fn has_brace(literal: &str) -> bool {
    literal.contains(|c: char| c == '{' || c == '}')
}
