use crate::ids::TargetId;

/// One audited target as returned by the fetch collaborator.
///
/// Order in the fetched list is significant: it decides batch membership.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetRecord {
    pub id: TargetId,
    pub display_name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub private: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub archived: bool,
}

impl TargetRecord {
    pub fn new(id: impl Into<TargetId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            private: false,
            archived: false,
        }
    }

    pub fn with_flags(mut self, private: bool, archived: bool) -> Self {
        self.private = private;
        self.archived = archived;
        self
    }
}
