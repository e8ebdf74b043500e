//! 检查状态机
//!
//! 检查生命周期只能向前：Receiving → Queued → Processing → Processed。

use pacs_core::{PacsError, Result, StudyState};
use std::collections::HashMap;

/// 检查状态机
#[derive(Debug, Clone)]
pub struct StudyStateMachine {
    transitions: HashMap<StudyState, StudyState>,
}

impl StudyStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert(StudyState::Receiving, StudyState::Queued);
        transitions.insert(StudyState::Queued, StudyState::Processing);
        transitions.insert(StudyState::Processing, StudyState::Processed);

        Self { transitions }
    }

    /// 下一个状态，终态返回 `None`
    pub fn next(&self, from: StudyState) -> Option<StudyState> {
        self.transitions.get(&from).copied()
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: StudyState, to: StudyState) -> bool {
        self.next(from) == Some(to)
    }

    /// 执行状态转换
    pub fn transition(&self, from: StudyState, to: StudyState) -> Result<StudyState> {
        if self.can_transition(from, to) {
            Ok(to)
        } else {
            Err(PacsError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<StudyState> {
        vec![
            StudyState::Receiving,
            StudyState::Queued,
            StudyState::Processing,
            StudyState::Processed,
        ]
    }
}

impl Default for StudyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = StudyStateMachine::new();

        assert!(sm.can_transition(StudyState::Receiving, StudyState::Queued));
        assert!(sm.can_transition(StudyState::Queued, StudyState::Processing));
        assert!(sm.can_transition(StudyState::Processing, StudyState::Processed));
    }

    #[test]
    fn test_no_back_transitions() {
        let sm = StudyStateMachine::new();

        // 已排队的检查不会重新打开
        assert!(!sm.can_transition(StudyState::Queued, StudyState::Receiving));
        assert!(!sm.can_transition(StudyState::Processed, StudyState::Queued));
        assert!(!sm.can_transition(StudyState::Receiving, StudyState::Processed));
        assert_eq!(sm.next(StudyState::Processed), None);
    }

    #[test]
    fn test_state_execution() {
        let sm = StudyStateMachine::new();

        let result = sm.transition(StudyState::Receiving, StudyState::Queued);
        assert_eq!(result.unwrap(), StudyState::Queued);

        let result = sm.transition(StudyState::Processed, StudyState::Receiving);
        assert!(result.is_err());
    }

    #[test]
    fn test_every_state_reaches_processed() {
        let sm = StudyStateMachine::new();
        for state in StudyStateMachine::get_all_states() {
            let mut current = state;
            while let Some(next) = sm.next(current) {
                current = next;
            }
            assert_eq!(current, StudyState::Processed);
        }
    }
}
