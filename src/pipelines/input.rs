//! Input classification and set expansion.
//!
//! An input reference is either one reads library or a collection of them.
//! Collections come in two shapes: the generic `KBaseSets.ReadsSet`, whose
//! members are listed by the set service, and the legacy
//! `KBaseRNASeq.RNASeqSampleSet`, which embeds parallel `sample_ids` and
//! `condition` lists in its own payload.

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

use crate::config::defs::{
    DEFAULT_CONDITION, PipelineError, READS_SET_TYPE, SAMPLE_SET_TYPE, SINGLE_LIBRARY_TYPES,
};
use crate::services::{ObjectInfo, Services};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    SingleLibrary,
    LibraryCollection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryLayout {
    SingleEnd,
    PairedEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryDescriptor {
    pub reference: String,
    pub type_tag: String,
    pub name: String,
    pub layout: LibraryLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMember {
    pub library_ref: String,
    pub condition: String,
}

impl CollectionMember {
    pub fn new(library_ref: String, condition: Option<String>) -> Self {
        let condition = condition
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONDITION.to_string());
        CollectionMember { library_ref, condition }
    }
}

/// Member enumeration for one collection schema.
#[async_trait]
pub trait SetExpander: Send + Sync {
    async fn expand(&self, services: &Services) -> Result<Vec<CollectionMember>, PipelineError>;
}

/// `KBaseSets.ReadsSet`: members come from the set service with their
/// reference paths resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadsSet {
    pub info: ObjectInfo,
}

/// `KBaseRNASeq.RNASeqSampleSet`: members are read from the object payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    pub info: ObjectInfo,
}

#[async_trait]
impl SetExpander for ReadsSet {
    async fn expand(&self, services: &Services) -> Result<Vec<CollectionMember>, PipelineError> {
        info!("Looking up reads references in ReadsSet {}", self.info.reference);
        let items = services.sets.get_reads_set_items(&self.info.reference).await?;
        Ok(items
            .into_iter()
            .map(|item| CollectionMember::new(item.reference, item.label))
            .collect())
    }
}

#[async_trait]
impl SetExpander for SampleSet {
    async fn expand(&self, services: &Services) -> Result<Vec<CollectionMember>, PipelineError> {
        info!("Reading sample list of RNASeqSampleSet {}", self.info.reference);
        let payload = services.workspace.get_object_data(&self.info.reference).await?;
        sample_set_members(&self.info.reference, &payload)
    }
}

fn string_list(payload: &Value, key: &str) -> Option<Result<Vec<String>, String>> {
    let list = payload.get(key)?;
    let Some(items) = list.as_array() else {
        return Some(Err(format!("\"{}\" is not a list", key)));
    };
    Some(
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("\"{}\" holds a non-string entry: {}", key, item))
            })
            .collect(),
    )
}

/// Pairs `sample_ids[i]` with `condition[i]`. A missing condition list labels
/// every member "unspecified"; lists of different lengths are a fault.
pub fn sample_set_members(reference: &str, payload: &Value) -> Result<Vec<CollectionMember>, PipelineError> {
    let fault = |msg: String| PipelineError::DataIntegrity(format!("sample set {}: {}", reference, msg));

    let sample_ids = string_list(payload, "sample_ids")
        .ok_or_else(|| fault("no \"sample_ids\" list".to_string()))?
        .map_err(fault)?;

    let conditions = match string_list(payload, "condition") {
        Some(list) => list.map_err(fault)?,
        None => {
            debug!("sample set {} carries no condition list", reference);
            return Ok(sample_ids
                .into_iter()
                .map(|id| CollectionMember::new(id, None))
                .collect());
        }
    };

    if conditions.len() != sample_ids.len() {
        return Err(fault(format!(
            "{} sample_ids but {} conditions",
            sample_ids.len(),
            conditions.len()
        )));
    }

    Ok(sample_ids
        .into_iter()
        .zip(conditions)
        .map(|(id, condition)| CollectionMember::new(id, Some(condition)))
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionDescriptor {
    GenericCollection(ReadsSet),
    LegacySampleSet(SampleSet),
}

impl CollectionDescriptor {
    pub fn info(&self) -> &ObjectInfo {
        match self {
            CollectionDescriptor::GenericCollection(set) => &set.info,
            CollectionDescriptor::LegacySampleSet(set) => &set.info,
        }
    }

    fn expander(&self) -> &dyn SetExpander {
        match self {
            CollectionDescriptor::GenericCollection(set) => set,
            CollectionDescriptor::LegacySampleSet(set) => set,
        }
    }

    /// Ordered members of the collection, order as stored in the source.
    pub async fn expand(&self, services: &Services) -> Result<Vec<CollectionMember>, PipelineError> {
        let members = self.expander().expand(services).await?;
        info!("{} expands to {} member(s)", self.info().reference, members.len());
        Ok(members)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputObject {
    Library(LibraryDescriptor),
    Collection(CollectionDescriptor),
}

impl InputObject {
    pub fn run_mode(&self) -> RunMode {
        match self {
            InputObject::Library(_) => RunMode::SingleLibrary,
            InputObject::Collection(_) => RunMode::LibraryCollection,
        }
    }
}

fn unsupported(info: &ObjectInfo) -> PipelineError {
    PipelineError::UnsupportedInputType {
        reference: info.reference.clone(),
        type_tag: info.type_tag.clone(),
    }
}

/// Decides the run mode from an object's type tag.
pub fn classify_info(info: ObjectInfo) -> Result<InputObject, PipelineError> {
    let type_name = info.type_name().to_string();

    if SINGLE_LIBRARY_TYPES.contains(&type_name.as_str()) {
        let layout = if type_name.ends_with(".PairedEndLibrary") {
            LibraryLayout::PairedEnd
        } else {
            LibraryLayout::SingleEnd
        };
        return Ok(InputObject::Library(LibraryDescriptor {
            reference: info.reference,
            type_tag: info.type_tag,
            name: info.name,
            layout,
        }));
    }

    match type_name.as_str() {
        READS_SET_TYPE => Ok(InputObject::Collection(CollectionDescriptor::GenericCollection(
            ReadsSet { info },
        ))),
        SAMPLE_SET_TYPE => Ok(InputObject::Collection(CollectionDescriptor::LegacySampleSet(
            SampleSet { info },
        ))),
        _ => Err(unsupported(&info)),
    }
}

/// Fetches the object's info and classifies it.
pub async fn classify_input(services: &Services, reference: &str) -> Result<InputObject, PipelineError> {
    let info = services.workspace.get_object_info(reference).await?;
    debug!("{} is a {}", reference, info.type_tag);
    classify_info(info)
}

/// Resolves a collection member to a concrete library; anything else is an
/// unsupported input.
pub async fn resolve_library(services: &Services, reference: &str) -> Result<LibraryDescriptor, PipelineError> {
    let info = services.workspace.get_object_info(reference).await?;
    let type_tag = info.type_tag.clone();
    match classify_info(info)? {
        InputObject::Library(library) => Ok(library),
        InputObject::Collection(_) => Err(PipelineError::UnsupportedInputType {
            reference: reference.to_string(),
            type_tag,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(type_tag: &str) -> ObjectInfo {
        ObjectInfo {
            reference: "1/2/3".to_string(),
            name: "input".to_string(),
            type_tag: type_tag.to_string(),
        }
    }

    #[test]
    fn test_single_library_types() {
        for (tag, layout) in [
            ("KBaseFile.SingleEndLibrary-2.2", LibraryLayout::SingleEnd),
            ("KBaseFile.PairedEndLibrary-2.2", LibraryLayout::PairedEnd),
            ("KBaseAssembly.SingleEndLibrary-1.0", LibraryLayout::SingleEnd),
            ("KBaseAssembly.PairedEndLibrary-1.0", LibraryLayout::PairedEnd),
        ] {
            match classify_info(info(tag)).unwrap() {
                InputObject::Library(library) => assert_eq!(library.layout, layout),
                other => panic!("{} classified as {:?}", tag, other),
            }
        }
    }

    #[test]
    fn test_collection_types() {
        let generic = classify_info(info("KBaseSets.ReadsSet-1.0")).unwrap();
        assert_eq!(generic.run_mode(), RunMode::LibraryCollection);
        assert!(matches!(
            generic,
            InputObject::Collection(CollectionDescriptor::GenericCollection(_))
        ));

        let legacy = classify_info(info("KBaseRNASeq.RNASeqSampleSet-3.0")).unwrap();
        assert!(matches!(
            legacy,
            InputObject::Collection(CollectionDescriptor::LegacySampleSet(_))
        ));
    }

    #[test]
    fn test_unsupported_type_carries_ref_and_tag() {
        match classify_info(info("KBaseGenomes.Genome-8.0")) {
            Err(PipelineError::UnsupportedInputType { reference, type_tag }) => {
                assert_eq!(reference, "1/2/3");
                assert_eq!(type_tag, "KBaseGenomes.Genome-8.0");
            }
            other => panic!("expected unsupported type, got {:?}", other),
        }
    }

    #[test]
    fn test_classification_is_stable() {
        let first = classify_info(info("KBaseSets.ReadsSet-1.0")).unwrap().run_mode();
        let second = classify_info(info("KBaseSets.ReadsSet-1.0")).unwrap().run_mode();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_set_pairs_conditions_in_order() {
        let payload = json!({"sample_ids": ["1/10/1", "1/11/1"], "condition": ["heat", "control"]});
        let members = sample_set_members("1/9/1", &payload).unwrap();
        assert_eq!(
            members,
            vec![
                CollectionMember::new("1/10/1".to_string(), Some("heat".to_string())),
                CollectionMember::new("1/11/1".to_string(), Some("control".to_string())),
            ]
        );
    }

    #[test]
    fn test_sample_set_length_mismatch_is_fault() {
        let payload = json!({"sample_ids": ["1/10/1", "1/11/1"], "condition": ["heat"]});
        assert!(matches!(
            sample_set_members("1/9/1", &payload),
            Err(PipelineError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_sample_set_without_conditions() {
        let payload = json!({"sample_ids": ["1/10/1"]});
        let members = sample_set_members("1/9/1", &payload).unwrap();
        assert_eq!(members[0].condition, "unspecified");
    }

    #[test]
    fn test_sample_set_without_ids_is_fault() {
        assert!(matches!(
            sample_set_members("1/9/1", &json!({"condition": []})),
            Err(PipelineError::DataIntegrity(_))
        ));
    }
}
