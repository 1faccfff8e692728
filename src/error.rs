use thiserror::Error;

/// 代理错误类型
///
/// 所有对外操作都在边界处转换成这里的某个变体，调用方据此区分
/// "合法的零值" 与 "操作失败"。
#[derive(Error, Debug)]
pub enum AgentError {
    /// 未加载钱包或配置缺失
    #[error("Configuration error: {0}")]
    Config(String),

    /// 密钥或地址编码无效
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// 金额非正数或不是有限值
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// 余额不足（含手续费预留）
    #[error("Insufficient funds: need {required} lamports (incl. fee reserve), have {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    /// 聚合器报价失败
    #[error("Quote error: {0}")]
    Quote(String),

    /// 超时、非 2xx、响应格式错误
    #[error("Network error: {0}")]
    Network(String),

    /// 价格源限流（仅用于诊断，缓存语义不变）
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// 钱包文件写入失败
    #[error("Failed to persist wallet: {0}")]
    Persist(String),

    /// 钱包文件损坏
    #[error("Corrupt wallet store: {0}")]
    CorruptStore(String),

    #[error("Signing error: {0}")]
    Signing(String),
}

impl AgentError {
    /// 是否为网络类错误（含限流）
    pub fn is_network(&self) -> bool {
        matches!(self, AgentError::Network(_) | AgentError::RateLimited(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            AgentError::RateLimited(e.to_string())
        } else {
            AgentError::Network(e.to_string())
        }
    }
}

impl From<solana_client::client_error::ClientError> for AgentError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        AgentError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
