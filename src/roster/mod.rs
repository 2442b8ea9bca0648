//! Specialist roster and prompt templates.
//!
//! The roster is data, not a type hierarchy: every specialist is the same
//! task type configured with an id, a display name and a prompt template.

pub mod template;

pub use template::PromptTemplate;

use crate::config::SpecialistConfig;
use crate::error::{PipelineError, TemplateError};
use std::collections::HashSet;

/// Placeholder bound to the document text in specialist templates.
pub const REPORT_PLACEHOLDER: &str = "medical_report";

/// Placeholder bound to the labeled specialist reports in the synthesis template.
pub const REPORTS_PLACEHOLDER: &str = "specialist_reports";

/// Placeholder bound to the comma-separated contributing role names.
pub const SPECIALISTS_PLACEHOLDER: &str = "specialists";

/// One specialist role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specialist {
    pub id: String,
    pub name: String,
    pub template: PromptTemplate,
}

impl Specialist {
    pub fn new(id: &str, name: &str, body: &str) -> Result<Self, TemplateError> {
        let template = PromptTemplate::new(id, body)?;
        template.require(REPORT_PLACEHOLDER)?;
        template.check_placeholders(&[REPORT_PLACEHOLDER])?;
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            template,
        })
    }
}

/// The fixed, ordered set of specialists for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    specialists: Vec<Specialist>,
}

impl Roster {
    /// Build a roster, rejecting an empty list or duplicate ids.
    pub fn new(specialists: Vec<Specialist>) -> Result<Self, PipelineError> {
        if specialists.is_empty() {
            return Err(PipelineError::config("specialist roster is empty"));
        }

        let mut seen = HashSet::new();
        for s in &specialists {
            if s.id.trim().is_empty() {
                return Err(PipelineError::config("specialist id must not be empty"));
            }
            if !seen.insert(s.id.as_str()) {
                return Err(PipelineError::config(format!(
                    "duplicate specialist id '{}'",
                    s.id
                )));
            }
        }

        Ok(Self { specialists })
    }

    /// Cardiologist, Psychologist, Pulmonologist.
    pub fn builtin() -> Self {
        let specialists = BUILTIN_SPECIALISTS
            .iter()
            .map(|(id, name, body)| Specialist::new(id, name, body))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default();
        Self { specialists }
    }

    /// Build from `[[specialists]]` config entries, falling back to the
    /// built-in roster when none are configured.
    pub fn from_config(entries: &[SpecialistConfig]) -> Result<Self, PipelineError> {
        if entries.is_empty() {
            return Ok(Self::builtin());
        }

        let specialists = entries
            .iter()
            .map(|e| Specialist::new(&e.id, &e.name, &e.template))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(specialists)
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specialist> {
        self.specialists.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.specialists.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Load the synthesis template, using the built-in one unless overridden.
pub fn synthesis_template(custom: Option<&str>) -> Result<PromptTemplate, TemplateError> {
    let template = PromptTemplate::new("synthesis", custom.unwrap_or(SYNTHESIS_TEMPLATE))?;
    template.require(REPORTS_PLACEHOLDER)?;
    template.check_placeholders(&[REPORTS_PLACEHOLDER, SPECIALISTS_PLACEHOLDER])?;
    Ok(template)
}

const BUILTIN_SPECIALISTS: &[(&str, &str, &str)] = &[
    ("cardiologist", "Cardiologist", CARDIOLOGIST_TEMPLATE),
    ("psychologist", "Psychologist", PSYCHOLOGIST_TEMPLATE),
    ("pulmonologist", "Pulmonologist", PULMONOLOGIST_TEMPLATE),
];

const CARDIOLOGIST_TEMPLATE: &str = r#"Act like a cardiologist. You will receive a medical report of a patient.
Task: Review the patient's cardiac workup, including ECG, blood tests, Holter monitor results, and echocardiogram.
Focus: Determine if there are any subtle signs of cardiac issues that could explain the patient's symptoms. Rule out any underlying heart conditions, such as arrhythmias or structural abnormalities, that might be missed on routine testing.
Recommendation: Provide guidance on any further cardiac testing or monitoring needed to ensure there are no hidden heart-related concerns. Suggest potential management strategies if a cardiac issue is identified.
Please only return the possible causes of the patient's symptoms and the recommended next steps.
Medical Report: {medical_report}"#;

const PSYCHOLOGIST_TEMPLATE: &str = r#"Act like a psychologist. You will receive a patient's report.
Task: Review the patient's report and provide a psychological assessment.
Focus: Identify any potential mental health issues, such as anxiety, depression, or trauma, that may be affecting the patient's well-being.
Recommendation: Offer guidance on how to address these mental health concerns, including therapy, counseling, or other interventions.
Please only return the possible mental health issues and the recommended next steps.
Patient's Report: {medical_report}"#;

const PULMONOLOGIST_TEMPLATE: &str = r#"Act like a pulmonologist. You will receive a patient's report.
Task: Review the patient's report and provide a pulmonary assessment.
Focus: Identify any potential respiratory issues, such as asthma, COPD, or lung infections, that may be affecting the patient's breathing.
Recommendation: Offer guidance on how to address these respiratory concerns, including pulmonary function tests, imaging studies, or other interventions.
Please only return the possible respiratory issues and the recommended next steps.
Patient's Report: {medical_report}"#;

const SYNTHESIS_TEMPLATE: &str = r#"Act like a multidisciplinary team of healthcare professionals.
You will receive the reports on one patient written by the following specialists: {specialists}.
Task: Review the specialists' reports, analyze them and come up with a list of 3 possible health issues of the patient.
Just return a list of bullet points of 3 possible health issues of the patient and for each issue provide the reason.

{specialist_reports}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roster() {
        let roster = Roster::builtin();
        assert_eq!(
            roster.ids(),
            vec!["cardiologist", "psychologist", "pulmonologist"]
        );
        for s in roster.iter() {
            assert!(s.template.placeholders().contains(&REPORT_PLACEHOLDER));
        }
    }

    #[test]
    fn test_roster_rejects_duplicates_and_empty() {
        let a = Specialist::new("a", "A", "{medical_report}").unwrap();
        assert!(Roster::new(vec![a.clone(), a.clone()]).is_err());
        assert!(Roster::new(vec![]).is_err());
        assert!(Roster::new(vec![a]).is_ok());
    }

    #[test]
    fn test_specialist_requires_report_placeholder() {
        assert!(Specialist::new("a", "A", "no placeholder here").is_err());
        assert!(Specialist::new("a", "A", "{medical_report} for {patient}").is_err());
    }

    #[test]
    fn test_roster_from_config() {
        let entries = vec![
            SpecialistConfig {
                id: "neuro".to_string(),
                name: "Neurologist".to_string(),
                template: "Act like a neurologist.\n{medical_report}".to_string(),
            },
            SpecialistConfig {
                id: "derm".to_string(),
                name: "Dermatologist".to_string(),
                template: "Act like a dermatologist.\n{medical_report}".to_string(),
            },
        ];
        let roster = Roster::from_config(&entries).unwrap();
        assert_eq!(roster.ids(), vec!["neuro", "derm"]);

        assert_eq!(Roster::from_config(&[]).unwrap(), Roster::builtin());
    }

    #[test]
    fn test_synthesis_template() {
        let t = synthesis_template(None).unwrap();
        assert_eq!(
            t.placeholders(),
            vec![SPECIALISTS_PLACEHOLDER, REPORTS_PLACEHOLDER]
        );
        assert!(synthesis_template(Some("Summarize: {specialists}")).is_err());
        assert!(synthesis_template(Some("Summarize:\n{specialist_reports}")).is_ok());
    }
}
