//! QC Test Catalog
//!
//! The numbered test catalog is configuration data: which tests exist, which
//! sample types they apply to, what they read and which tests roll up into
//! which. Two built-in catalogs are provided; custom catalogs can be loaded
//! from settings and are validated before use.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::rules::RatioRule;
use crate::core::{MeasuredField, QcError, QcResult, SampleType, TestId};

/// Summary role of a rollup test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupRole {
    /// All improbable observations have been accepted
    ImprobableAccepted,
    /// All data points are within their possible range
    PossibleRange,
    /// All quality control tests have been passed
    OverallQc,
}

/// Processing flag checked by the sample-level processing tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Lab,
    Otolith,
}

/// What a test evaluates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestKind {
    /// Field is populated
    Presence { field: MeasuredField },
    /// Field lies within its possible range
    PossibleRange { field: MeasuredField },
    /// Field lies within its probable range (overridable)
    ProbableRange { field: MeasuredField },
    /// Cross-field regression plausibility (overridable)
    Ratio { rule: RatioRule },
    /// Summary over other tests
    Rollup {
        role: RollupRole,
        depends_on: Vec<TestId>,
    },
    /// Every mandatory field is populated
    MandatoryFields,
    /// Length-frequency observations add up to the fish measured
    LengthFrequencySum,
    /// Externally computed processing-complete flag
    ProcessingComplete { stage: ProcessingStage },
}

impl TestKind {
    /// Short label used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Presence { .. } => "presence",
            TestKind::PossibleRange { .. } => "possible-range",
            TestKind::ProbableRange { .. } => "probable-range",
            TestKind::Ratio { .. } => "ratio",
            TestKind::Rollup { .. } => "rollup",
            TestKind::MandatoryFields => "mandatory-fields",
            TestKind::LengthFrequencySum => "length-frequency",
            TestKind::ProcessingComplete { .. } => "processing-complete",
        }
    }

    /// Whether a failure of this test may be accepted by the user
    pub fn is_acceptable(&self) -> bool {
        matches!(self, TestKind::Ratio { .. } | TestKind::ProbableRange { .. })
    }

    /// Form fields this test reads
    pub fn input_fields(&self) -> Vec<&'static str> {
        match self {
            TestKind::Presence { field }
            | TestKind::PossibleRange { field }
            | TestKind::ProbableRange { field } => vec![field.as_str()],
            TestKind::Ratio { rule } => rule.input_fields().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Dependency ids for rollups, empty otherwise
    pub fn dependencies(&self) -> &[TestId] {
        match self {
            TestKind::Rollup { depends_on, .. } => depends_on,
            _ => &[],
        }
    }
}

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Numeric test id
    pub id: TestId,
    /// What the test asserts
    pub description: String,
    /// Sample types the test applies to
    pub scope: Vec<SampleType>,
    /// Evaluation kind
    #[serde(flatten)]
    pub kind: TestKind,
}

impl TestDefinition {
    /// Creates a new definition
    pub fn new(
        id: TestId,
        description: impl Into<String>,
        scope: &[SampleType],
        kind: TestKind,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            scope: scope.to_vec(),
            kind,
        }
    }

    /// Check if this test applies to a sample type
    pub fn applies_to(&self, sample_type: SampleType) -> bool {
        self.scope.contains(&sample_type)
    }
}

/// Presence / possible / probable test ids for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTests {
    pub presence: TestId,
    pub possible: TestId,
    pub probable: Option<TestId>,
}

/// The set of test definitions in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCatalog {
    /// Definitions in id order
    pub tests: Vec<TestDefinition>,
}

const LAB: &[SampleType] = &[SampleType::LabSample];
const OTOLITH: &[SampleType] = &[SampleType::OtolithSample];
const SAMPLE_LEVEL: &[SampleType] = &[SampleType::PortSample, SampleType::SeaSample];

fn presence(id: TestId, field: MeasuredField, scope: &[SampleType]) -> TestDefinition {
    TestDefinition::new(
        id,
        format!("{} is present", field.verbose_name()),
        scope,
        TestKind::Presence { field },
    )
}

fn possible(id: TestId, field: MeasuredField, scope: &[SampleType]) -> TestDefinition {
    TestDefinition::new(
        id,
        format!("{} is within the possible range", field.verbose_name()),
        scope,
        TestKind::PossibleRange { field },
    )
}

fn probable(id: TestId, field: MeasuredField, scope: &[SampleType]) -> TestDefinition {
    TestDefinition::new(
        id,
        format!("{} is within the probable range", field.verbose_name()),
        scope,
        TestKind::ProbableRange { field },
    )
}

fn rollup(
    id: TestId,
    description: &str,
    scope: &[SampleType],
    role: RollupRole,
    depends_on: &[TestId],
) -> TestDefinition {
    TestDefinition::new(
        id,
        description,
        scope,
        TestKind::Rollup {
            role,
            depends_on: depends_on.to_vec(),
        },
    )
}

fn ratio(id: TestId, description: &str, scope: &[SampleType], rule: RatioRule) -> TestDefinition {
    TestDefinition::new(id, description, scope, TestKind::Ratio { rule })
}

fn mandatory(id: TestId, scope: &[SampleType]) -> TestDefinition {
    TestDefinition::new(
        id,
        "All mandatory fields are complete",
        scope,
        TestKind::MandatoryFields,
    )
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::current()
    }
}

impl TestCatalog {
    /// Catalog used by the current lab and otolith forms
    pub fn current() -> Self {
        let mut tests = vec![
            rollup(
                200,
                "All otolith quality control tests have been passed",
                OTOLITH,
                RollupRole::OverallQc,
                &[206, 210, 211],
            ),
            rollup(
                201,
                "All lab quality control tests have been passed",
                LAB,
                RollupRole::OverallQc,
                &[202, 203, 208],
            ),
            mandatory(202, LAB),
            rollup(
                203,
                "All data points are within their possible range",
                LAB,
                RollupRole::PossibleRange,
                &[301, 304, 307],
            ),
            ratio(
                204,
                "Fish length : fish weight ratio is within the probable range",
                LAB,
                RatioRule::LengthWeight,
            ),
            TestDefinition::new(
                205,
                "Sum of length frequency observations equals total fish measured",
                SAMPLE_LEVEL,
                TestKind::LengthFrequencySum,
            ),
            mandatory(206, OTOLITH),
            ratio(
                207,
                "Gonad weight : somatic weight : maturity level is within the probable range",
                LAB,
                RatioRule::GonadSomaticMaturity,
            ),
            rollup(
                208,
                "All improbable observations have been accepted",
                LAB,
                RollupRole::ImprobableAccepted,
                &[204, 207],
            ),
            ratio(
                209,
                "Number of annuli : fish length is within the probable range",
                OTOLITH,
                RatioRule::LengthAnnulus,
            ),
            rollup(
                210,
                "All data points are within their possible range",
                OTOLITH,
                RollupRole::PossibleRange,
                &[310],
            ),
            rollup(
                211,
                "All improbable observations have been accepted",
                OTOLITH,
                RollupRole::ImprobableAccepted,
                &[209],
            ),
            mandatory(230, SAMPLE_LEVEL),
            TestDefinition::new(
                231,
                "All lab samples have been processed",
                SAMPLE_LEVEL,
                TestKind::ProcessingComplete {
                    stage: ProcessingStage::Lab,
                },
            ),
            TestDefinition::new(
                232,
                "All otolith samples have been processed",
                SAMPLE_LEVEL,
                TestKind::ProcessingComplete {
                    stage: ProcessingStage::Otolith,
                },
            ),
            presence(300, MeasuredField::FishLength, LAB),
            possible(301, MeasuredField::FishLength, LAB),
            presence(303, MeasuredField::FishWeight, LAB),
            possible(304, MeasuredField::FishWeight, LAB),
            presence(306, MeasuredField::GonadWeight, LAB),
            possible(307, MeasuredField::GonadWeight, LAB),
            presence(309, MeasuredField::AnnulusCount, OTOLITH),
            possible(310, MeasuredField::AnnulusCount, OTOLITH),
        ];
        tests.sort_by_key(|t| t.id);
        Self { tests }
    }

    /// Earlier lab-only catalog with per-field probable-range tests
    pub fn legacy() -> Self {
        let mut tests = vec![
            rollup(
                201,
                "All lab quality control tests have been passed",
                LAB,
                RollupRole::OverallQc,
                &[202, 203, 208],
            ),
            mandatory(202, LAB),
            rollup(
                203,
                "All data points are within their possible range",
                LAB,
                RollupRole::PossibleRange,
                &[301, 304, 307],
            ),
            ratio(
                204,
                "Fish length : fish weight ratio is within the probable range",
                LAB,
                RatioRule::LengthWeight,
            ),
            ratio(
                207,
                "Gonad weight : somatic weight : maturity level is within the probable range",
                LAB,
                RatioRule::GonadSomaticMaturity,
            ),
            rollup(
                208,
                "All improbable observations have been accepted",
                LAB,
                RollupRole::ImprobableAccepted,
                &[204, 207, 302, 305, 308, 311],
            ),
        ];
        let fields = [
            (300, MeasuredField::FishLength),
            (303, MeasuredField::FishWeight),
            (306, MeasuredField::GonadWeight),
            (309, MeasuredField::AnnulusCount),
        ];
        for (base, field) in fields {
            tests.push(presence(base, field, LAB));
            tests.push(possible(base + 1, field, LAB));
            tests.push(probable(base + 2, field, LAB));
        }
        tests.sort_by_key(|t| t.id);
        Self { tests }
    }

    /// Gets a definition by id
    pub fn get(&self, id: TestId) -> QcResult<&TestDefinition> {
        self.tests
            .iter()
            .find(|t| t.id == id)
            .ok_or(QcError::UnknownTest(id))
    }

    /// Gets a definition by id, checking it applies to the sample type
    pub fn get_for(&self, id: TestId, sample_type: SampleType) -> QcResult<&TestDefinition> {
        let def = self.get(id)?;
        if !def.applies_to(sample_type) {
            return Err(QcError::NotApplicable {
                test_id: id,
                sample_type,
            });
        }
        Ok(def)
    }

    /// All tests that apply to a sample type, in id order
    pub fn tests_for(&self, sample_type: SampleType) -> impl Iterator<Item = &TestDefinition> {
        self.tests.iter().filter(move |t| t.applies_to(sample_type))
    }

    /// Presence/possible/probable ids for a field, if the sample type tests it
    pub fn field_tests(&self, field: MeasuredField, sample_type: SampleType) -> Option<FieldTests> {
        let mut presence = None;
        let mut possible = None;
        let mut probable = None;
        for def in self.tests_for(sample_type) {
            match def.kind {
                TestKind::Presence { field: f } if f == field => presence = Some(def.id),
                TestKind::PossibleRange { field: f } if f == field => possible = Some(def.id),
                TestKind::ProbableRange { field: f } if f == field => probable = Some(def.id),
                _ => {}
            }
        }
        Some(FieldTests {
            presence: presence?,
            possible: possible?,
            probable,
        })
    }

    /// Tests applicable to a sample type that read the given form field
    pub fn tests_reading<'a>(
        &'a self,
        field_name: &'a str,
        sample_type: SampleType,
    ) -> impl Iterator<Item = &'a TestDefinition> + 'a {
        self.tests_for(sample_type)
            .filter(move |t| t.kind.input_fields().iter().any(|f| *f == field_name))
    }

    /// Rollups for a sample type ordered so dependencies come first
    pub fn rollup_order(&self, sample_type: SampleType) -> QcResult<Vec<TestId>> {
        let rollups: BTreeMap<TestId, &[TestId]> = self
            .tests_for(sample_type)
            .filter(|t| matches!(t.kind, TestKind::Rollup { .. }))
            .map(|t| (t.id, t.kind.dependencies()))
            .collect();

        let mut order = Vec::with_capacity(rollups.len());
        let mut done = BTreeSet::new();
        let mut visiting = BTreeSet::new();
        for id in rollups.keys() {
            visit_rollup(*id, &rollups, &mut visiting, &mut done, &mut order)?;
        }
        Ok(order)
    }

    /// Rollups that transitively depend on any of `changed`, in evaluation order
    pub fn dependent_rollups(
        &self,
        changed: &[TestId],
        sample_type: SampleType,
    ) -> QcResult<Vec<TestId>> {
        let mut dirty: BTreeSet<TestId> = changed.iter().copied().collect();
        let mut result = Vec::new();
        for id in self.rollup_order(sample_type)? {
            let def = self.get(id)?;
            if def.kind.dependencies().iter().any(|d| dirty.contains(d)) {
                dirty.insert(id);
                result.push(id);
            }
        }
        Ok(result)
    }

    /// Overridable tests feeding the improbable-accepted rollups of a sample type
    pub fn confirmable_tests(&self, sample_type: SampleType) -> BTreeSet<TestId> {
        self.tests_for(sample_type)
            .filter_map(|t| match &t.kind {
                TestKind::Rollup {
                    role: RollupRole::ImprobableAccepted,
                    depends_on,
                } => Some(depends_on.iter().copied()),
                _ => None,
            })
            .flatten()
            .filter(|id| {
                self.get(*id)
                    .map(|d| d.kind.is_acceptable())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Checks the catalog is internally consistent
    pub fn validate(&self) -> QcResult<()> {
        let mut seen = BTreeSet::new();
        for def in &self.tests {
            if !seen.insert(def.id) {
                return Err(QcError::InvalidCatalog(format!(
                    "duplicate test id {}",
                    def.id
                )));
            }
            if def.scope.is_empty() {
                return Err(QcError::InvalidCatalog(format!(
                    "test {} has an empty scope",
                    def.id
                )));
            }
        }

        for def in &self.tests {
            for dep in def.kind.dependencies() {
                let dep_def = self.get(*dep).map_err(|_| {
                    QcError::InvalidCatalog(format!(
                        "rollup {} depends on unknown test {}",
                        def.id, dep
                    ))
                })?;
                if *dep == def.id {
                    return Err(QcError::InvalidCatalog(format!(
                        "rollup {} depends on itself",
                        def.id
                    )));
                }
                if !def.scope.iter().all(|s| dep_def.applies_to(*s)) {
                    return Err(QcError::InvalidCatalog(format!(
                        "rollup {} depends on test {} outside its scope",
                        def.id, dep
                    )));
                }
            }
        }

        for sample_type in SampleType::ALL {
            self.rollup_order(sample_type)?;
            for field in MeasuredField::ALL {
                self.validate_field_tests(field, sample_type)?;
            }
            let confirmable = self.confirmable_tests(sample_type);
            if let Some(orphan) = self
                .tests_for(sample_type)
                .find(|t| t.kind.is_acceptable() && !confirmable.contains(&t.id))
            {
                return Err(QcError::InvalidCatalog(format!(
                    "overridable test {} is not covered by an improbable-accepted rollup for {sample_type}",
                    orphan.id
                )));
            }
        }
        Ok(())
    }

    fn validate_field_tests(&self, field: MeasuredField, sample_type: SampleType) -> QcResult<()> {
        let mut counts = [0usize; 3];
        for def in self.tests_for(sample_type) {
            match def.kind {
                TestKind::Presence { field: f } if f == field => counts[0] += 1,
                TestKind::PossibleRange { field: f } if f == field => counts[1] += 1,
                TestKind::ProbableRange { field: f } if f == field => counts[2] += 1,
                _ => {}
            }
        }
        if counts.iter().any(|c| *c > 1) {
            return Err(QcError::InvalidCatalog(format!(
                "{field} has more than one test of the same role for {sample_type}"
            )));
        }
        let any = counts.iter().any(|c| *c > 0);
        if any && (counts[0] == 0 || counts[1] == 0) {
            return Err(QcError::InvalidCatalog(format!(
                "{field} needs both a presence and a possible-range test for {sample_type}"
            )));
        }
        Ok(())
    }
}

fn visit_rollup(
    id: TestId,
    rollups: &BTreeMap<TestId, &[TestId]>,
    visiting: &mut BTreeSet<TestId>,
    done: &mut BTreeSet<TestId>,
    order: &mut Vec<TestId>,
) -> QcResult<()> {
    if done.contains(&id) {
        return Ok(());
    }
    if !visiting.insert(id) {
        return Err(QcError::InvalidCatalog(format!(
            "rollup dependency cycle through test {id}"
        )));
    }
    if let Some(deps) = rollups.get(&id) {
        for dep in deps.iter() {
            if rollups.contains_key(dep) {
                visit_rollup(*dep, rollups, visiting, done, order)?;
            }
        }
    }
    visiting.remove(&id);
    done.insert(id);
    order.push(id);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Built-in Catalogs
    // ========================================================================

    #[test]
    fn test_current_catalog_is_valid() {
        TestCatalog::current().validate().unwrap();
    }

    #[test]
    fn test_legacy_catalog_is_valid() {
        TestCatalog::legacy().validate().unwrap();
    }

    #[test]
    fn test_current_field_tests() {
        let catalog = TestCatalog::current();

        let length = catalog
            .field_tests(MeasuredField::FishLength, SampleType::LabSample)
            .unwrap();
        assert_eq!(length.presence, 300);
        assert_eq!(length.possible, 301);
        assert_eq!(length.probable, None);

        let annulus = catalog
            .field_tests(MeasuredField::AnnulusCount, SampleType::OtolithSample)
            .unwrap();
        assert_eq!((annulus.presence, annulus.possible), (309, 310));

        assert!(catalog
            .field_tests(MeasuredField::AnnulusCount, SampleType::LabSample)
            .is_none());
    }

    #[test]
    fn test_legacy_field_tests_include_probable() {
        let catalog = TestCatalog::legacy();
        let weight = catalog
            .field_tests(MeasuredField::FishWeight, SampleType::LabSample)
            .unwrap();
        assert_eq!(weight.probable, Some(305));
    }

    #[test]
    fn test_get_for_rejects_other_sample_type() {
        let catalog = TestCatalog::current();
        assert!(catalog.get_for(204, SampleType::LabSample).is_ok());
        assert!(matches!(
            catalog.get_for(209, SampleType::LabSample),
            Err(QcError::NotApplicable { test_id: 209, .. })
        ));
        assert!(matches!(catalog.get(999), Err(QcError::UnknownTest(999))));
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    #[test]
    fn test_rollup_order_puts_overall_qc_last() {
        let catalog = TestCatalog::current();
        let lab = catalog.rollup_order(SampleType::LabSample).unwrap();
        assert_eq!(lab.last(), Some(&201));
        assert_eq!(lab.len(), 3);

        let otolith = catalog.rollup_order(SampleType::OtolithSample).unwrap();
        assert_eq!(otolith.last(), Some(&200));
    }

    #[test]
    fn test_dependent_rollups_are_transitive() {
        let catalog = TestCatalog::current();
        let affected = catalog
            .dependent_rollups(&[304], SampleType::LabSample)
            .unwrap();
        assert_eq!(affected, vec![203, 201]);

        let affected = catalog
            .dependent_rollups(&[204], SampleType::LabSample)
            .unwrap();
        assert_eq!(affected, vec![208, 201]);
    }

    #[test]
    fn test_tests_reading_field() {
        let catalog = TestCatalog::current();
        let ids: Vec<TestId> = catalog
            .tests_reading("fish_length", SampleType::LabSample)
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![204, 300, 301]);

        let ids: Vec<TestId> = catalog
            .tests_reading("maturity", SampleType::LabSample)
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![207]);
    }

    #[test]
    fn test_confirmable_tests() {
        let catalog = TestCatalog::current();
        let lab: Vec<_> = catalog
            .confirmable_tests(SampleType::LabSample)
            .into_iter()
            .collect();
        assert_eq!(lab, vec![204, 207]);

        let otolith: Vec<_> = catalog
            .confirmable_tests(SampleType::OtolithSample)
            .into_iter()
            .collect();
        assert_eq!(otolith, vec![209]);
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut catalog = TestCatalog::current();
        let dup = catalog.tests[0].clone();
        catalog.tests.push(dup);
        assert!(matches!(
            catalog.validate(),
            Err(QcError::InvalidCatalog(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let mut catalog = TestCatalog::current();
        catalog.tests.push(rollup(
            250,
            "broken",
            LAB,
            RollupRole::OverallQc,
            &[999],
        ));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let mut catalog = TestCatalog::current();
        for def in catalog.tests.iter_mut() {
            if def.id == 203 {
                def.kind = TestKind::Rollup {
                    role: RollupRole::PossibleRange,
                    depends_on: vec![301, 201],
                };
            }
        }
        assert!(matches!(
            catalog.validate(),
            Err(QcError::InvalidCatalog(msg)) if msg.contains("cycle")
        ));
    }

    #[test]
    fn test_validate_rejects_presence_without_possible() {
        let mut catalog = TestCatalog::current();
        catalog.tests.retain(|t| t.id != 304);
        for def in catalog.tests.iter_mut() {
            if def.id == 203 {
                def.kind = TestKind::Rollup {
                    role: RollupRole::PossibleRange,
                    depends_on: vec![301, 307],
                };
            }
        }
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_uncovered_overridable_test() {
        let mut catalog = TestCatalog::legacy();
        for def in catalog.tests.iter_mut() {
            if def.id == 208 {
                def.kind = TestKind::Rollup {
                    role: RollupRole::ImprobableAccepted,
                    depends_on: vec![204, 207, 302, 305, 308],
                };
            }
        }
        assert!(matches!(
            catalog.validate(),
            Err(QcError::InvalidCatalog(msg)) if msg.contains("overridable test 311")
        ));
    }

    #[test]
    fn test_legacy_annulus_probable_feeds_improbable_rollup() {
        let catalog = TestCatalog::legacy();
        assert!(catalog
            .confirmable_tests(SampleType::LabSample)
            .contains(&311));
    }

    #[test]
    fn test_catalog_json_shape() {
        let catalog = TestCatalog::current();
        let json = serde_json::to_value(&catalog).unwrap();
        let first = &json["tests"][0];
        assert_eq!(first["id"], 200);
        assert_eq!(first["kind"], "rollup");
        assert_eq!(first["role"], "overall_qc");
        assert_eq!(first["depends_on"], serde_json::json!([206, 210, 211]));

        let parsed: TestCatalog = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, catalog);
    }
}
