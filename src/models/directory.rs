use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProgramLevel {
    Undergraduate,
    Graduate,
}

impl ProgramLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramLevel::Undergraduate => "undergraduate",
            ProgramLevel::Graduate => "graduate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "undergraduate" => Some(ProgramLevel::Undergraduate),
            "graduate" => Some(ProgramLevel::Graduate),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgramLevel::Undergraduate => "undergraduate (BS)",
            ProgramLevel::Graduate => "graduate (MS)",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Advisor {
    pub advisor_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub program_level: ProgramLevel,
    pub office_location: Option<String>,
}

impl Advisor {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Academic Advisor")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub student_id: String,
    pub email: String,
    pub name: String,
    pub program_level: ProgramLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_level_round_trips_through_str() {
        for level in [ProgramLevel::Undergraduate, ProgramLevel::Graduate] {
            assert_eq!(ProgramLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(ProgramLevel::parse(" Graduate "), Some(ProgramLevel::Graduate));
        assert_eq!(ProgramLevel::parse("phd"), None);
    }

    #[test]
    fn test_program_level_serde_is_lowercase() {
        let json = serde_json::to_string(&ProgramLevel::Undergraduate).unwrap();
        assert_eq!(json, "\"undergraduate\"");
    }
}
