use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ReportStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl ReportStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

str_enum!(InstanceStatus {
    Draft => "draft",
    Completed => "completed",
    Archived => "archived",
});

str_enum!(TemplateType {
    Progress => "progress",
    Discharge => "discharge",
    Assessment => "assessment",
    Incident => "incident",
    Other => "other",
});

str_enum!(ApprovalStatus {
    Draft => "draft",
    PendingApproval => "pending_approval",
    Approved => "approved",
});

str_enum!(NotificationType {
    Request => "request",
    Reminder => "reminder",
    Completion => "completion",
    Overdue => "overdue",
});

str_enum!(ContentType {
    MedicalHistory => "medical_history",
    TreatmentSummary => "treatment_summary",
    BackgroundHistory => "background_history",
    MedicalStatus => "medical_status",
    ProgressNote => "progress_note",
});

str_enum!(FieldType {
    AutoPopulated => "auto_populated",
    AiParagraph => "ai_paragraph",
    RichText => "rich_text",
    StructuredTable => "structured_table",
    StructuredFields => "structured_fields",
    DigitalSignature => "digital_signature",
    MultipleChoice => "multiple_choice",
    Checklist => "checklist",
    DynamicSections => "dynamic_sections",
    MultiSignature => "multi_signature",
    Paragraph => "paragraph",
    DatePicker => "date_picker",
    NumberInput => "number_input",
});

/// Report priority: 1 = low, 2 = normal, 3 = high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
        }
    }

    pub fn from_i64(n: i64) -> Result<Self, DatabaseError> {
        match n {
            1 => Ok(Self::Low),
            2 => Ok(Self::Normal),
            3 => Ok(Self::High),
            _ => Err(DatabaseError::InvalidEnum {
                field: "Priority".into(),
                value: n.to_string(),
            }),
        }
    }
}
