use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SugarCategory {
    High,
    Moderate,
    Zero,
}

/// A sweetener the user can pick when confirming added sugar.
#[derive(Debug, Clone, Serialize)]
pub struct SugarType {
    pub id: &'static str,
    pub name: &'static str,
    pub gi: f64,
    pub category: SugarCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

pub const SUGAR_TYPES: &[SugarType] = &[
    SugarType { id: "white_sugar", name: "White Sugar", gi: 65.0, category: SugarCategory::High, description: None },
    SugarType { id: "brown_sugar", name: "Brown Sugar", gi: 65.0, category: SugarCategory::High, description: None },
    SugarType {
        id: "jaggery",
        name: "Jaggery (Gur)",
        gi: 80.0,
        category: SugarCategory::High,
        description: Some("Not diabetic-safe"),
    },
    SugarType { id: "honey", name: "Honey", gi: 58.0, category: SugarCategory::Moderate, description: None },
    SugarType { id: "coconut_sugar", name: "Coconut Sugar", gi: 38.0, category: SugarCategory::Moderate, description: None },
    SugarType { id: "date_syrup", name: "Date Syrup", gi: 62.0, category: SugarCategory::Moderate, description: None },
    SugarType { id: "stevia", name: "Stevia / Zero Cal", gi: 0.0, category: SugarCategory::Zero, description: None },
];

pub fn sugar_type(id: &str) -> Option<&'static SugarType> {
    SUGAR_TYPES.iter().find(|t| t.id == id)
}
