//! Grouping attributes: map a scored application to the group it is audited under.
//!
//! No demographic data is collected, so the default attribute is a proxy: experience
//! years bucketed into junior / mid / senior. It is a heuristic, not a protected class,
//! and a passing audit under it says nothing about legal fairness. Real protected
//! attributes plug in by implementing `GroupingAttribute`; the statistics never change.

use crate::models::application::ScoredApplication;

pub trait GroupingAttribute: Send + Sync {
    /// Attribute name recorded in every report, e.g. `experience_level`.
    fn name(&self) -> &str;

    fn group(&self, application: &ScoredApplication) -> String;
}

/// Experience-years proxy: `< 2` junior, `2..5` mid, `>= 5` senior. Missing years count as 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExperienceBuckets;

impl ExperienceBuckets {
    pub fn bucket(years: i32) -> &'static str {
        if years < 2 {
            "junior"
        } else if years < 5 {
            "mid"
        } else {
            "senior"
        }
    }
}

impl GroupingAttribute for ExperienceBuckets {
    fn name(&self) -> &str {
        "experience_level"
    }

    fn group(&self, application: &ScoredApplication) -> String {
        Self::bucket(application.experience_years.unwrap_or(0)).to_string()
    }
}

/// Adapter so a plain closure can serve as a grouping attribute.
pub struct FnGrouping<F> {
    name: String,
    f: F,
}

impl<F> FnGrouping<F>
where
    F: Fn(&ScoredApplication) -> String + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

impl<F> GroupingAttribute for FnGrouping<F>
where
    F: Fn(&ScoredApplication) -> String + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self, application: &ScoredApplication) -> String {
        (self.f)(application)
    }
}
