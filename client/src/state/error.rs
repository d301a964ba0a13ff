use thiserror::Error;

/// 状态相关错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// 转写条目不存在
    #[error("Transcript entry {0} not found")]
    EntryNotFound(usize),

    /// 打开的条目不是助手条目
    #[error("Transcript entry {0} is not an assistant entry")]
    NotAssistantEntry(usize),
}

/// 状态模块的结果类型
pub type StateResult<T> = Result<T, StateError>;
