use crate::core::error::AppResult;
use anyhow::Context;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("mcp-provisioner/", env!("CARGO_PKG_VERSION"));

/// 构建出站 HTTP 客户端
///
/// - `proxy_url`: 可选代理（http / https / socks5 / socks5h），空字符串视为未设置
/// - `timeout`: 整体请求超时；模型下载这类长连接传 None
pub fn build_http_client(proxy_url: Option<&str>, timeout: Option<Duration>) -> AppResult<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(url) = proxy_url.map(str::trim).filter(|u| !u.is_empty()) {
        let proxy = reqwest::Proxy::all(url).with_context(|| format!("代理 URL 无效: {url}"))?;
        tracing::debug!(proxy = %mask_credentials(url), "出站请求使用代理");
        builder = builder.proxy(proxy);
    }

    Ok(builder.build().context("构建 HTTP 客户端失败")?)
}

/// 日志中隐藏代理 URL 里的用户名密码
fn mask_credentials(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{scheme}://***@{host}"),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}
