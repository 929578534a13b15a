use std::fmt;

use serde::{Deserialize, Serialize};

/// How a dataset represents its control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionEncoding {
    /// End-effector pose delta plus gripper.
    EefPos,
    JointPos,
    JointPosBimanual,
    #[serde(rename = "nav_2d")]
    Nav2d,
}

impl ActionEncoding {
    /// Only end-effector pose deltas can be mixed into one policy.
    pub fn is_supported(self) -> bool {
        matches!(self, ActionEncoding::EefPos)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionEncoding::EefPos => "eef_pos",
            ActionEncoding::JointPos => "joint_pos",
            ActionEncoding::JointPosBimanual => "joint_pos_bimanual",
            ActionEncoding::Nav2d => "nav_2d",
        }
    }
}

impl fmt::Display for ActionEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
