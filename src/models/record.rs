//! Persistent proxy record
//!
//! Wraps one [`Profile`] together with the bookkeeping the row store keeps for it.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::models::Profile;

/// Result of the last health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProfileStatus {
    #[default]
    Initial,
    Available,
    /// Unclear failure
    Unreachable,
    /// Has an obvious error
    Unavailable,
}

impl ProfileStatus {
    pub fn to_i32(self) -> i32 {
        match self {
            ProfileStatus::Initial => 0,
            ProfileStatus::Available => 1,
            ProfileStatus::Unreachable => 2,
            ProfileStatus::Unavailable => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ProfileStatus::Initial),
            1 => Some(ProfileStatus::Available),
            2 => Some(ProfileStatus::Unreachable),
            3 => Some(ProfileStatus::Unavailable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub id: i64,
    pub group_id: i64,
    pub user_order: i64,
    /// Bytes sent
    pub tx: i64,
    /// Bytes received
    pub rx: i64,
    pub status: ProfileStatus,
    /// Last measured latency in ms
    pub ping: i32,
    pub uuid: String,
    pub error: Option<String>,
    profile: Profile,
    /// Unsaved edits; never written to the row store columns
    #[serde(skip)]
    pub dirty: bool,
}

impl ProxyRecord {
    pub fn new(profile: Profile) -> Self {
        Self {
            id: 0,
            group_id: 0,
            user_order: 0,
            tx: 0,
            rx: 0,
            status: ProfileStatus::Initial,
            ping: 0,
            uuid: uuid::Uuid::new_v4().to_string(),
            error: None,
            profile,
            dirty: false,
        }
    }

    /// Type tag of the held profile. Always consistent with [`Self::require_bean`].
    pub fn type_tag(&self) -> i32 {
        self.profile.type_tag()
    }

    pub fn require_bean(&self) -> &Profile {
        &self.profile
    }

    pub fn require_bean_mut(&mut self) -> &mut Profile {
        &mut self.profile
    }

    /// Replace the profile, switching the record's type along with it.
    pub fn put_bean(&mut self, profile: Profile) -> &mut Self {
        self.profile = profile;
        self
    }

    /// Replace the profile without changing the record's type.
    pub fn set_bean(&mut self, profile: Profile) -> Result<(), CodecError> {
        if profile.type_tag() != self.type_tag() {
            return Err(CodecError::TypeMismatch {
                expected: self.type_tag(),
                actual: profile.type_tag(),
            });
        }
        self.profile = profile;
        Ok(())
    }

    pub fn needs_external(&self) -> bool {
        self.profile.needs_external()
    }

    pub fn display_name(&self) -> String {
        self.profile.display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommonFields, DirectBean, HysteriaBean, ProfileBean, TYPE_DIRECT, TYPE_HYSTERIA};

    fn direct() -> Profile {
        Profile::new(CommonFields::default(), ProfileBean::Direct(DirectBean::default()))
    }

    fn hysteria() -> Profile {
        Profile::new(
            CommonFields::default(),
            ProfileBean::Hysteria(HysteriaBean::default()),
        )
    }

    #[test]
    fn put_bean_switches_type() {
        let mut record = ProxyRecord::new(direct());
        assert_eq!(record.type_tag(), TYPE_DIRECT);

        record.put_bean(hysteria());
        assert_eq!(record.type_tag(), TYPE_HYSTERIA);
        assert!(matches!(record.require_bean().bean, ProfileBean::Hysteria(_)));
    }

    #[test]
    fn set_bean_rejects_other_type() {
        let mut record = ProxyRecord::new(direct());
        let err = record.set_bean(hysteria()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TypeMismatch {
                expected: TYPE_DIRECT,
                actual: TYPE_HYSTERIA
            }
        ));
        assert_eq!(record.type_tag(), TYPE_DIRECT);

        let mut renamed = direct();
        renamed.common.name = "home".to_string();
        record.set_bean(renamed).unwrap();
        assert_eq!(record.display_name(), "home");
    }

    #[test]
    fn status_round_trips_through_integer() {
        for status in [
            ProfileStatus::Initial,
            ProfileStatus::Available,
            ProfileStatus::Unreachable,
            ProfileStatus::Unavailable,
        ] {
            assert_eq!(ProfileStatus::from_i32(status.to_i32()), Some(status));
        }
        assert_eq!(ProfileStatus::from_i32(-1), None);
    }
}
