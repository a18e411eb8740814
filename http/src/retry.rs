use rand::{thread_rng, Rng};
use std::{mem::take, time::Duration};

/// 重试退避策略
///
/// 闭合的策略集合，由 [`BackoffPolicy::delay_ms`] 统一计算退避时长
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackoffPolicy {
    /// 固定退避
    Fixed {
        /// 退避时长，单位为毫秒
        period: u64,
    },

    /// 随机退避
    Random {
        /// 退避基准时长，单位为毫秒
        period: u64,
        /// 退避时长上限，单位为毫秒
        cap: u64,
    },

    /// 指数退避
    Exponential {
        /// 指数系数
        period: u64,
        /// 退避时长上限，单位为毫秒
        cap: u64,
    },

    /// 等值抖动退避
    EqualJitter {
        /// 退避基准时长，单位为毫秒
        period: u64,
        /// 退避时长上限，单位为毫秒
        cap: u64,
    },

    /// 全量抖动退避
    FullJitter {
        /// 退避基准时长，单位为毫秒
        period: u64,
        /// 退避时长上限，单位为毫秒
        cap: u64,
    },
}

impl BackoffPolicy {
    /// 根据已重试次数计算退避时长
    ///
    /// 单位为毫秒，`attempts` 从 1 开始计数
    pub fn delay_ms(&self, attempts: usize) -> u64 {
        match self {
            Self::Fixed { period } => *period,
            Self::Random { period, cap } => {
                let upper = (attempts as u64).saturating_mul(*period);
                if upper == 0 {
                    0
                } else {
                    thread_rng().gen_range(0..=upper).min(*cap)
                }
            }
            Self::Exponential { period, cap } => pow2(
                (attempts as u64).saturating_mul(*period),
            )
            .min(*cap),
            Self::EqualJitter { cap, .. } => {
                let ceil = pow2(attempts as u64).min(*cap);
                let floor = ceil / 2;
                if ceil == 0 {
                    0
                } else {
                    thread_rng().gen_range(floor..=ceil)
                }
            }
            Self::FullJitter { cap, .. } => {
                let ceil = pow2(attempts as u64).min(*cap);
                if ceil == 0 {
                    0
                } else {
                    thread_rng().gen_range(0..=ceil)
                }
            }
        }
    }

    /// 根据已重试次数计算退避时长
    #[inline]
    pub fn delay(&self, attempts: usize) -> Duration {
        Duration::from_millis(self.delay_ms(attempts))
    }
}

#[inline]
fn pow2(exp: u64) -> u64 {
    if exp >= u64::BITS as u64 {
        u64::MAX
    } else {
        1u64 << exp
    }
}

/// 重试条件
///
/// 通过错误名称或错误码匹配一次失败，并限定该条件下的
/// 最大重试次数、退避上限与退避策略
#[derive(Debug, Clone, Default)]
pub struct RetryCondition {
    exceptions: Vec<String>,
    error_codes: Vec<String>,
    max_attempts: usize,
    max_delay: Option<Duration>,
    backoff: Option<BackoffPolicy>,
}

impl RetryCondition {
    /// 创建重试条件构建器
    #[inline]
    pub fn builder() -> RetryConditionBuilder {
        RetryConditionBuilder::default()
    }

    /// 获取匹配的错误名称列表
    #[inline]
    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    /// 获取匹配的错误码列表
    #[inline]
    pub fn error_codes(&self) -> &[String] {
        &self.error_codes
    }

    /// 获取该条件下的最大重试次数
    #[inline]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// 获取该条件下的退避时长上限
    #[inline]
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// 获取该条件下的退避策略
    #[inline]
    pub fn backoff(&self) -> Option<&BackoffPolicy> {
        self.backoff.as_ref()
    }

    /// 判断错误名称或错误码是否命中该条件
    #[inline]
    pub fn matches(&self, name: &str, code: Option<&str>) -> bool {
        self.exceptions.iter().any(|exception| exception == name)
            || code.map_or(false, |code| {
                self.error_codes.iter().any(|error_code| error_code == code)
            })
    }
}

/// 重试条件构建器
#[derive(Debug, Default)]
pub struct RetryConditionBuilder {
    inner: RetryCondition,
}

impl RetryConditionBuilder {
    /// 追加匹配的错误名称
    #[inline]
    pub fn exception(&mut self, exception: impl Into<String>) -> &mut Self {
        self.inner.exceptions.push(exception.into());
        self
    }

    /// 追加匹配的错误码
    #[inline]
    pub fn error_code(&mut self, error_code: impl Into<String>) -> &mut Self {
        self.inner.error_codes.push(error_code.into());
        self
    }

    /// 设置该条件下的最大重试次数
    #[inline]
    pub fn max_attempts(&mut self, max_attempts: usize) -> &mut Self {
        self.inner.max_attempts = max_attempts;
        self
    }

    /// 设置该条件下的退避时长上限
    #[inline]
    pub fn max_delay(&mut self, max_delay: Duration) -> &mut Self {
        self.inner.max_delay = Some(max_delay);
        self
    }

    /// 设置该条件下的退避策略
    #[inline]
    pub fn backoff(&mut self, backoff: BackoffPolicy) -> &mut Self {
        self.inner.backoff = Some(backoff);
        self
    }

    /// 构建重试条件，同时构建器被重置
    #[inline]
    pub fn build(&mut self) -> RetryCondition {
        take(&mut self.inner)
    }
}

/// 重试选项
///
/// 否决条件先于重试条件判定
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    retryable: bool,
    retry_conditions: Vec<RetryCondition>,
    no_retry_conditions: Vec<RetryCondition>,
}

impl RetryOptions {
    /// 创建重试选项构建器
    #[inline]
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::default()
    }

    /// 是否允许重试
    #[inline]
    pub fn retryable(&self) -> bool {
        self.retryable
    }

    /// 获取重试条件列表
    #[inline]
    pub fn retry_conditions(&self) -> &[RetryCondition] {
        &self.retry_conditions
    }

    /// 获取否决重试的条件列表
    #[inline]
    pub fn no_retry_conditions(&self) -> &[RetryCondition] {
        &self.no_retry_conditions
    }
}

/// 重试选项构建器
#[derive(Debug, Default)]
pub struct RetryOptionsBuilder {
    inner: RetryOptions,
}

impl RetryOptionsBuilder {
    /// 设置是否允许重试
    #[inline]
    pub fn retryable(&mut self, retryable: bool) -> &mut Self {
        self.inner.retryable = retryable;
        self
    }

    /// 追加重试条件
    #[inline]
    pub fn retry_condition(&mut self, condition: RetryCondition) -> &mut Self {
        self.inner.retry_conditions.push(condition);
        self
    }

    /// 追加否决重试的条件
    #[inline]
    pub fn no_retry_condition(&mut self, condition: RetryCondition) -> &mut Self {
        self.inner.no_retry_conditions.push(condition);
        self
    }

    /// 构建重试选项，同时构建器被重置
    #[inline]
    pub fn build(&mut self) -> RetryOptions {
        take(&mut self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff_ignores_attempts() {
        let policy = BackoffPolicy::Fixed { period: 1000 };
        assert_eq!(policy.delay_ms(1), 1000);
        assert_eq!(policy.delay_ms(5), 1000);
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = BackoffPolicy::Exponential {
            period: 1,
            cap: 86400000,
        };
        assert_eq!(policy.delay_ms(1), 2);
        assert_eq!(policy.delay_ms(2), 4);
        assert_eq!(policy.delay_ms(3), 8);
    }

    #[test]
    fn test_exponential_backoff_saturates_to_cap() {
        let policy = BackoffPolicy::Exponential {
            period: 1000,
            cap: 60000,
        };
        assert_eq!(policy.delay_ms(100), 60000);
    }

    #[test]
    fn test_random_backoff_is_bounded() {
        let policy = BackoffPolicy::Random {
            period: 1000,
            cap: 2500,
        };
        for attempts in 1..=10 {
            let delay = policy.delay_ms(attempts);
            assert!(delay <= 2500);
        }
    }

    #[test]
    fn test_jitter_backoffs_stay_within_bounds() {
        let equal = BackoffPolicy::EqualJitter {
            period: 100,
            cap: 1024,
        };
        let full = BackoffPolicy::FullJitter {
            period: 100,
            cap: 1024,
        };
        for attempts in 1u64..=20 {
            let ceil = 1024u64.min(1u64 << attempts);
            let delay = equal.delay_ms(attempts as usize);
            assert!(delay >= ceil / 2 && delay <= ceil);
            assert!(full.delay_ms(attempts as usize) <= ceil);
        }
    }

    #[test]
    fn test_condition_matches_by_name_or_code() {
        let condition = RetryCondition::builder()
            .exception("ResponseException")
            .error_code("Throttling")
            .max_attempts(3)
            .build();
        assert!(condition.matches("ResponseException", None));
        assert!(condition.matches("RequestException", Some("Throttling")));
        assert!(!condition.matches("RequestException", Some("InvalidAccessKey")));
    }
}
