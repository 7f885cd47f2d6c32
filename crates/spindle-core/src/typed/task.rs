//! Params / Task trait - 型付き params と task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Provided method による共通の入口 (`Params::parse`)

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{TaskType, ValidationError};

/// 型付き params。task / condition / action 共通。
///
/// `parse` が唯一の入口で、serde の形チェックの後に `verify` を呼ぶ。
/// 呼び出し側（dispatcher / evaluator / executor）は handler 本体を呼ぶ前に
/// 一度だけ `parse` を通す。
pub trait Params: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 形は正しいが値が不正なもの（空文字、範囲外など）を弾く
    fn verify(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    fn parse(raw: &serde_json::Value) -> Result<Self, ValidationError> {
        let params: Self = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::with_detail("params", e.to_string()))?;
        params.verify()?;
        Ok(params)
    }
}

/// Task は handler 名と params 型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct TriggerRun { id: TriggerId }
///
/// impl Params for TriggerRun {}
/// impl Task for TriggerRun {
///     const TYPE: TaskType = TaskType::AutomateTriggerRun;
/// }
/// ```
pub trait Task: Params {
    const TYPE: TaskType;
}

/// 空でない文字列フィールドのチェック
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Scan {
        network: String,
        from: u64,
    }

    impl Params for Scan {
        fn verify(&self) -> Result<(), ValidationError> {
            require_non_empty("network", &self.network)
        }
    }

    #[test]
    fn parse_checks_shape_then_values() {
        let ok = Scan::parse(&json!({"network": "1", "from": 10})).unwrap();
        assert_eq!(ok.from, 10);

        let shape = Scan::parse(&json!({"network": "1"})).unwrap_err();
        assert_eq!(shape.field(), "params");

        let value = Scan::parse(&json!({"network": " ", "from": 1})).unwrap_err();
        assert_eq!(value.to_string(), "Invalid network");
    }
}
