use super::retry::RetryOptions;
use std::{mem::take, path::PathBuf, time::Duration};

/// 未配置连接超时时使用的缺省值
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// 请求运行时选项
///
/// 每个字段都是可选的，未设置的字段由传输引擎决定缺省行为
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    autoretry: Option<bool>,
    ignore_ssl: Option<bool>,
    key: Option<PathBuf>,
    cert: Option<PathBuf>,
    ca: Option<PathBuf>,
    max_attempts: Option<usize>,
    backoff_policy: Option<String>,
    backoff_period: Option<u64>,
    read_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    http_proxy: Option<String>,
    https_proxy: Option<String>,
    no_proxy: Option<String>,
    max_idle_conns: Option<usize>,
    local_addr: Option<String>,
    socks5_proxy: Option<String>,
    socks5_net_work: Option<String>,
    keep_alive: Option<bool>,
    retry_options: Option<RetryOptions>,
}

impl RuntimeOptions {
    /// 创建请求运行时选项构建器
    #[inline]
    pub fn builder() -> RuntimeOptionsBuilder {
        RuntimeOptionsBuilder::default()
    }

    /// 是否在失败后自动重试
    #[inline]
    pub fn autoretry(&self) -> Option<bool> {
        self.autoretry
    }

    /// 是否跳过 SSL 证书校验，未设置时校验开启
    #[inline]
    pub fn ignore_ssl(&self) -> Option<bool> {
        self.ignore_ssl
    }

    /// 获取客户端私钥文件路径
    #[inline]
    pub fn key(&self) -> Option<&PathBuf> {
        self.key.as_ref()
    }

    /// 获取客户端证书文件路径
    #[inline]
    pub fn cert(&self) -> Option<&PathBuf> {
        self.cert.as_ref()
    }

    /// 获取 CA 证书文件路径
    #[inline]
    pub fn ca(&self) -> Option<&PathBuf> {
        self.ca.as_ref()
    }

    /// 获取最大重试次数
    #[inline]
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// 获取退避策略名称
    #[inline]
    pub fn backoff_policy(&self) -> Option<&str> {
        self.backoff_policy.as_deref()
    }

    /// 获取退避基准时长
    ///
    /// 单位为毫秒
    #[inline]
    pub fn backoff_period(&self) -> Option<u64> {
        self.backoff_period
    }

    /// 获取读取超时时长
    #[inline]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// 获取连接超时时长
    #[inline]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// 获取连接超时时长，未设置或非正值时返回缺省值
    #[inline]
    pub fn effective_connect_timeout(&self) -> Duration {
        self.connect_timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// 获取 HTTP 代理地址
    #[inline]
    pub fn http_proxy(&self) -> Option<&str> {
        self.http_proxy.as_deref()
    }

    /// 获取 HTTPS 代理地址
    #[inline]
    pub fn https_proxy(&self) -> Option<&str> {
        self.https_proxy.as_deref()
    }

    /// 获取不经过代理的主机列表
    #[inline]
    pub fn no_proxy(&self) -> Option<&str> {
        self.no_proxy.as_deref()
    }

    /// 获取最大空闲连接数量
    #[inline]
    pub fn max_idle_conns(&self) -> Option<usize> {
        self.max_idle_conns
    }

    /// 获取本地网络接口地址
    #[inline]
    pub fn local_addr(&self) -> Option<&str> {
        self.local_addr.as_deref()
    }

    /// 获取 SOCKS5 代理地址
    #[inline]
    pub fn socks5_proxy(&self) -> Option<&str> {
        self.socks5_proxy.as_deref()
    }

    /// 获取 SOCKS5 代理网络类型
    #[inline]
    pub fn socks5_net_work(&self) -> Option<&str> {
        self.socks5_net_work.as_deref()
    }

    /// 是否复用连接，未设置时复用开启
    #[inline]
    pub fn keep_alive(&self) -> Option<bool> {
        self.keep_alive
    }

    /// 获取重试选项
    #[inline]
    pub fn retry_options(&self) -> Option<&RetryOptions> {
        self.retry_options.as_ref()
    }
}

/// 请求运行时选项构建器
#[derive(Debug, Default)]
pub struct RuntimeOptionsBuilder {
    inner: RuntimeOptions,
}

impl RuntimeOptionsBuilder {
    /// 设置是否在失败后自动重试
    #[inline]
    pub fn autoretry(&mut self, autoretry: bool) -> &mut Self {
        self.inner.autoretry = Some(autoretry);
        self
    }

    /// 设置是否跳过 SSL 证书校验
    #[inline]
    pub fn ignore_ssl(&mut self, ignore_ssl: bool) -> &mut Self {
        self.inner.ignore_ssl = Some(ignore_ssl);
        self
    }

    /// 设置客户端私钥文件路径
    #[inline]
    pub fn key(&mut self, key: impl Into<PathBuf>) -> &mut Self {
        self.inner.key = Some(key.into());
        self
    }

    /// 设置客户端证书文件路径
    #[inline]
    pub fn cert(&mut self, cert: impl Into<PathBuf>) -> &mut Self {
        self.inner.cert = Some(cert.into());
        self
    }

    /// 设置 CA 证书文件路径
    #[inline]
    pub fn ca(&mut self, ca: impl Into<PathBuf>) -> &mut Self {
        self.inner.ca = Some(ca.into());
        self
    }

    /// 设置最大重试次数
    #[inline]
    pub fn max_attempts(&mut self, max_attempts: usize) -> &mut Self {
        self.inner.max_attempts = Some(max_attempts);
        self
    }

    /// 设置退避策略名称
    #[inline]
    pub fn backoff_policy(&mut self, backoff_policy: impl Into<String>) -> &mut Self {
        self.inner.backoff_policy = Some(backoff_policy.into());
        self
    }

    /// 设置退避基准时长，单位为毫秒
    #[inline]
    pub fn backoff_period(&mut self, backoff_period: u64) -> &mut Self {
        self.inner.backoff_period = Some(backoff_period);
        self
    }

    /// 设置读取超时时长
    #[inline]
    pub fn read_timeout(&mut self, read_timeout: Duration) -> &mut Self {
        self.inner.read_timeout = Some(read_timeout);
        self
    }

    /// 设置连接超时时长
    #[inline]
    pub fn connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.inner.connect_timeout = Some(connect_timeout);
        self
    }

    /// 设置 HTTP 代理地址
    #[inline]
    pub fn http_proxy(&mut self, http_proxy: impl Into<String>) -> &mut Self {
        self.inner.http_proxy = Some(http_proxy.into());
        self
    }

    /// 设置 HTTPS 代理地址
    #[inline]
    pub fn https_proxy(&mut self, https_proxy: impl Into<String>) -> &mut Self {
        self.inner.https_proxy = Some(https_proxy.into());
        self
    }

    /// 设置不经过代理的主机列表
    #[inline]
    pub fn no_proxy(&mut self, no_proxy: impl Into<String>) -> &mut Self {
        self.inner.no_proxy = Some(no_proxy.into());
        self
    }

    /// 设置最大空闲连接数量
    #[inline]
    pub fn max_idle_conns(&mut self, max_idle_conns: usize) -> &mut Self {
        self.inner.max_idle_conns = Some(max_idle_conns);
        self
    }

    /// 设置本地网络接口地址
    #[inline]
    pub fn local_addr(&mut self, local_addr: impl Into<String>) -> &mut Self {
        self.inner.local_addr = Some(local_addr.into());
        self
    }

    /// 设置 SOCKS5 代理地址
    #[inline]
    pub fn socks5_proxy(&mut self, socks5_proxy: impl Into<String>) -> &mut Self {
        self.inner.socks5_proxy = Some(socks5_proxy.into());
        self
    }

    /// 设置 SOCKS5 代理网络类型
    #[inline]
    pub fn socks5_net_work(&mut self, socks5_net_work: impl Into<String>) -> &mut Self {
        self.inner.socks5_net_work = Some(socks5_net_work.into());
        self
    }

    /// 设置是否复用连接
    #[inline]
    pub fn keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        self.inner.keep_alive = Some(keep_alive);
        self
    }

    /// 设置重试选项
    #[inline]
    pub fn retry_options(&mut self, retry_options: RetryOptions) -> &mut Self {
        self.inner.retry_options = Some(retry_options);
        self
    }

    /// 构建请求运行时选项，同时构建器被重置
    #[inline]
    pub fn build(&mut self) -> RuntimeOptions {
        take(&mut self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_stay_unset() {
        let options = RuntimeOptions::default();
        assert_eq!(options.autoretry(), None);
        assert_eq!(options.connect_timeout(), None);
        assert_eq!(options.effective_connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(options.retry_options().is_none());
    }

    #[test]
    fn test_zero_connect_timeout_falls_back_to_default() {
        let options = RuntimeOptions::builder()
            .connect_timeout(Duration::ZERO)
            .build();
        assert_eq!(options.effective_connect_timeout(), DEFAULT_CONNECT_TIMEOUT);

        let options = RuntimeOptions::builder()
            .connect_timeout(Duration::from_secs(1))
            .build();
        assert_eq!(options.effective_connect_timeout(), Duration::from_secs(1));
    }
}
