//! The scene document backing a timeline
//!
//! A scene carries the staging data a timeline plays against: stages,
//! cameras keyed by identifier, and the actor roster with their spatial
//! transforms. The copy engine pulls referenced records across from the
//! source scene; every add skips records already present so a copy can be
//! replayed without duplicating staging data.

use std::collections::HashMap;

use stagehand_document::{Document, NodeHandle, NodeSpec};

use crate::error::TimelineError;
use crate::timeline::MAP_KEY_ATTR;

const IDENTIFIER_ATTR: &str = "Identifier";
const TEMPLATE_ID_ATTR: &str = "TemplateId";

/// One `TLStage` record
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub(crate) handle: NodeHandle,
    pub identifier: String,
    pub name: Option<String>,
    pub variation_conditions_id: Option<String>,
    pub variation_target_id: Option<String>,
}

/// One camera: the keyed `Object` wrapper and the camera node inside it
#[derive(Debug, Clone)]
pub struct CameraRecord {
    pub(crate) handle: NodeHandle,
    pub(crate) camera: NodeHandle,
    pub map_key: String,
    pub name: String,
}

/// One `TLActor` record
#[derive(Debug, Clone)]
pub struct SceneActor {
    pub(crate) handle: NodeHandle,
    pub actor_type: String,
    pub template_id: Option<String>,
    pub(crate) transforms: Option<NodeHandle>,
}

/// A parsed scene document
#[derive(Debug, Clone)]
pub struct SceneTree {
    pub doc: Document,
    stages_container: NodeHandle,
    stages: Vec<StageRecord>,
    cameras_container: NodeHandle,
    cameras: Vec<CameraRecord>,
    actors_container: NodeHandle,
    actors: Vec<SceneActor>,
}

impl SceneTree {
    pub fn from_document(doc: Document) -> Result<Self, TimelineError> {
        let root = doc.root();

        let stages_container = doc.child_with_id(root, "TLStages")?;
        let mut stages = Vec::new();
        for handle in doc.children_with_id(stages_container, "TLStage") {
            stages.push(parse_stage(&doc, handle)?);
        }

        let cameras_container = doc.child_with_id(root, "TLCameras")?;
        let mut cameras = Vec::new();
        for handle in doc.children_with_id(cameras_container, "Object") {
            cameras.push(parse_camera(&doc, handle)?);
        }

        let actors_container = doc.child_with_id(root, "TLActors")?;
        let mut actors = Vec::new();
        for handle in doc.children_with_id(actors_container, "TLActor") {
            actors.push(parse_actor(&doc, handle)?);
        }

        Ok(Self {
            doc,
            stages_container,
            stages,
            cameras_container,
            cameras,
            actors_container,
            actors,
        })
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn cameras(&self) -> &[CameraRecord] {
        &self.cameras
    }

    pub fn actors(&self) -> &[SceneActor] {
        &self.actors
    }

    pub fn stage(&self, identifier: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.identifier == identifier)
    }

    pub fn camera(&self, map_key: &str) -> Option<&CameraRecord> {
        self.cameras.iter().find(|c| c.map_key == map_key)
    }

    /// Identifiers named by a stage record, for dependency chasing
    pub fn stage_identifiers(&self, identifier: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(stage) = self.stage(identifier) {
            self.doc.collect_identifier_values(stage.handle, &mut out);
        }
        out
    }

    /// Copy a stage record across from `source`, skipping duplicates
    pub fn add_stage(
        &mut self,
        source: &SceneTree,
        handle: NodeHandle,
    ) -> Result<(), TimelineError> {
        let stage = parse_stage(&source.doc, handle)?;
        if self.stage(&stage.identifier).is_some() {
            tracing::debug!(identifier = %stage.identifier, "stage already present, skipping");
            return Ok(());
        }
        let copied = self.doc.copy_subtree_from(&source.doc, handle);
        self.doc.append_child(self.stages_container, copied, None)?;
        let mut record = stage;
        record.handle = copied;
        self.stages.push(record);
        Ok(())
    }

    /// Copy a camera record across from `source`
    ///
    /// A camera already present under the same key is merged instead: each of
    /// the incoming camera's child groups lands under the matching group of
    /// the existing camera, skipping objects whose key is already there.
    pub fn add_camera(
        &mut self,
        source: &SceneTree,
        handle: NodeHandle,
    ) -> Result<(), TimelineError> {
        let incoming = parse_camera(&source.doc, handle)?;
        let Some(existing) = self.camera(&incoming.map_key).cloned() else {
            let copied = self.doc.copy_subtree_from(&source.doc, handle);
            self.doc.append_child(self.cameras_container, copied, None)?;
            self.cameras.push(parse_camera(&self.doc, copied)?);
            return Ok(());
        };
        tracing::debug!(
            map_key = %incoming.map_key,
            "camera already present, merging child groups"
        );
        let groups: Vec<NodeHandle> = source.doc.children(incoming.camera).collect();
        for group in groups {
            let Some(group_id) = source.doc.node_id(group).map(str::to_string) else {
                continue;
            };
            let objects: Vec<NodeHandle> = source.doc.children(group).collect();
            if objects.is_empty() {
                continue;
            }
            let target = match self
                .doc
                .children_with_id(existing.camera, &group_id)
                .first()
                .copied()
            {
                Some(target) => target,
                None => {
                    let created = self
                        .doc
                        .create_node(&NodeSpec::new(&group_id).with_empty_children());
                    self.doc.append_child(existing.camera, created, None)?;
                    created
                }
            };
            for object in objects {
                let map_key = source.doc.attr_value_opt(object, MAP_KEY_ATTR);
                if let Some(map_key) = map_key {
                    let present = self
                        .doc
                        .children(target)
                        .any(|h| self.doc.attr_value_opt(h, MAP_KEY_ATTR) == Some(map_key));
                    if present {
                        tracing::debug!(map_key, "camera child object already present, skipping");
                        continue;
                    }
                }
                let copied = self.doc.copy_subtree_from(&source.doc, object);
                self.doc
                    .append_child(target, copied, Some(&existing.name))?;
            }
        }
        Ok(())
    }

    /// Copy an actor record across from `source`
    ///
    /// Actors without a template id are never copied. An actor already
    /// present under the same template keeps its record and absorbs the
    /// incoming transform objects instead.
    pub fn add_actor(
        &mut self,
        source: &SceneTree,
        handle: NodeHandle,
    ) -> Result<(), TimelineError> {
        let incoming = parse_actor(&source.doc, handle)?;
        let Some(template_id) = incoming.template_id.clone() else {
            tracing::debug!("not adding actor with empty template id");
            return Ok(());
        };
        let existing = self
            .actors
            .iter()
            .position(|a| a.template_id.as_deref() == Some(template_id.as_str()));
        if let Some(index) = existing {
            let Some(source_transforms) = incoming.transforms else {
                return Ok(());
            };
            tracing::debug!(
                template_id = %template_id,
                "actor already present, combining transform objects"
            );
            let target = match self.actors[index].transforms {
                Some(target) => target,
                None => {
                    let created = self
                        .doc
                        .create_node(&NodeSpec::new("Transforms").with_empty_children());
                    self.doc
                        .append_child(self.actors[index].handle, created, None)?;
                    self.actors[index].transforms = Some(created);
                    created
                }
            };
            for object in source.doc.children_with_id(source_transforms, "Object") {
                let map_key = source.doc.attr_value(object, MAP_KEY_ATTR)?;
                let present = self
                    .doc
                    .children(target)
                    .any(|h| self.doc.attr_value_opt(h, MAP_KEY_ATTR) == Some(map_key));
                if present {
                    tracing::debug!(map_key, "duplicate actor transform, skipping");
                    continue;
                }
                let copied = self.doc.copy_subtree_from(&source.doc, object);
                self.doc.append_child(
                    target,
                    copied,
                    Some("Adding transform object for scene actor"),
                )?;
            }
            return Ok(());
        }
        let copied = self.doc.copy_subtree_from(&source.doc, handle);
        self.doc
            .append_child(self.actors_container, copied, Some("Adding scene actor node"))?;
        self.actors.push(parse_actor(&self.doc, copied)?);
        Ok(())
    }

    /// Point actors at replacement templates, returning the touched records
    pub fn retarget_actor_templates(
        &mut self,
        template_map: &HashMap<String, String>,
    ) -> Result<Vec<NodeHandle>, TimelineError> {
        let mut touched = Vec::new();
        for actor in &mut self.actors {
            let Some(template_id) = actor.template_id.as_deref() else {
                continue;
            };
            let Some(replacement) = template_map.get(template_id) else {
                continue;
            };
            self.doc
                .set_attr(actor.handle, TEMPLATE_ID_ATTR, replacement, None)?;
            actor.template_id = Some(replacement.clone());
            touched.push(actor.handle);
        }
        Ok(touched)
    }
}

fn parse_stage(doc: &Document, handle: NodeHandle) -> Result<StageRecord, TimelineError> {
    Ok(StageRecord {
        handle,
        identifier: doc.attr_value(handle, IDENTIFIER_ATTR)?.to_string(),
        name: doc.attr_value_opt(handle, "Name").map(str::to_string),
        variation_conditions_id: doc
            .attr_value_opt(handle, "VariationConditionsId")
            .map(str::to_string),
        variation_target_id: doc
            .attr_value_opt(handle, "VariationTargetId")
            .map(str::to_string),
    })
}

fn parse_camera(doc: &Document, handle: NodeHandle) -> Result<CameraRecord, TimelineError> {
    let map_key = doc.attr_value(handle, MAP_KEY_ATTR)?.to_string();
    let camera = doc.child_with_id(handle, "TLCameras")?;
    let identifier = doc.attr_value(camera, IDENTIFIER_ATTR)?;
    if identifier != map_key {
        return Err(TimelineError::CameraKeyMismatch {
            map_key,
            identifier: identifier.to_string(),
        });
    }
    Ok(CameraRecord {
        handle,
        camera,
        map_key,
        name: doc.attr_value(camera, "Name")?.to_string(),
    })
}

fn parse_actor(doc: &Document, handle: NodeHandle) -> Result<SceneActor, TimelineError> {
    let transforms = match doc.children_with_id(handle, "Transforms").as_slice() {
        [] => None,
        _ => Some(doc.child_with_id(handle, "Transforms")?),
    };
    Ok(SceneActor {
        handle,
        actor_type: doc.attr_value(handle, "ActorType")?.to_string(),
        template_id: doc.attr_value_opt(handle, TEMPLATE_ID_ATTR).map(str::to_string),
        transforms,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use stagehand_document::Attribute;

    fn stage_spec(identifier: &str, name: &str) -> NodeSpec {
        NodeSpec::new("TLStage")
            .with_attr(Attribute::identifier(IDENTIFIER_ATTR, identifier))
            .with_attr(Attribute::new("Name", "LSString", name))
    }

    fn transform_object(map_key: &str, position: &str) -> NodeSpec {
        NodeSpec::new("Object")
            .with_key(MAP_KEY_ATTR)
            .with_attr(Attribute::identifier(MAP_KEY_ATTR, map_key))
            .with_attr(Attribute::new("Position", "fvec3", position))
    }

    fn camera_spec(map_key: &str, name: &str, stage_objects: &[&str]) -> NodeSpec {
        let mut transform_group = NodeSpec::new("Transform").with_empty_children();
        for stage in stage_objects {
            transform_group = transform_group.with_child(transform_object(stage, "0 0 0"));
        }
        NodeSpec::new("Object")
            .with_key(MAP_KEY_ATTR)
            .with_attr(Attribute::identifier(MAP_KEY_ATTR, map_key))
            .with_child(
                NodeSpec::new("TLCameras")
                    .with_attr(Attribute::identifier(IDENTIFIER_ATTR, map_key))
                    .with_attr(Attribute::new("Name", "LSString", name))
                    .with_child(transform_group),
            )
    }

    fn actor_spec(actor_type: &str, template_id: Option<&str>, transforms: &[&str]) -> NodeSpec {
        let mut spec = NodeSpec::new("TLActor")
            .with_attr(Attribute::new("ActorType", "LSString", actor_type));
        if let Some(template_id) = template_id {
            spec = spec.with_attr(Attribute::identifier(TEMPLATE_ID_ATTR, template_id));
        }
        if !transforms.is_empty() {
            let mut container = NodeSpec::new("Transforms").with_empty_children();
            for stage in transforms {
                container = container.with_child(transform_object(stage, "1 0 1"));
            }
            spec = spec.with_child(container);
        }
        spec
    }

    pub(crate) fn sample_scene(
        stages: &[(&str, &str)],
        cameras: &[(&str, &str, &[&str])],
        actors: &[(&str, Option<&str>, &[&str])],
    ) -> SceneTree {
        let mut stages_node = NodeSpec::new("TLStages").with_empty_children();
        for (identifier, name) in stages {
            stages_node = stages_node.with_child(stage_spec(identifier, name));
        }
        let mut cameras_node = NodeSpec::new("TLCameras").with_empty_children();
        for (map_key, name, objects) in cameras {
            cameras_node = cameras_node.with_child(camera_spec(map_key, name, objects));
        }
        let mut actors_node = NodeSpec::new("TLActors").with_empty_children();
        for (actor_type, template_id, transforms) in actors {
            actors_node = actors_node.with_child(actor_spec(actor_type, *template_id, transforms));
        }
        let doc = Document::new(
            "region",
            NodeSpec::new("TimelineSceneContent")
                .with_child(stages_node)
                .with_child(cameras_node)
                .with_child(actors_node),
        );
        SceneTree::from_document(doc).unwrap()
    }

    #[test]
    fn test_parse_scene() {
        let scene = sample_scene(
            &[("stage-1", "Wide")],
            &[("cam-1", "CloseUp A", &["stage-1"])],
            &[("character", Some("tpl-1"), &["stage-1"]), ("scenecam", None, &[])],
        );
        assert_eq!(scene.stages().len(), 1);
        assert_eq!(scene.cameras().len(), 1);
        assert_eq!(scene.cameras()[0].name, "CloseUp A");
        assert_eq!(scene.actors().len(), 2);
        assert!(scene.actors()[1].template_id.is_none());
        assert!(scene.stage("stage-1").is_some());
        assert!(scene.camera("cam-9").is_none());
    }

    #[test]
    fn test_parse_rejects_camera_key_mismatch() {
        let doc = Document::new(
            "region",
            NodeSpec::new("TimelineSceneContent")
                .with_child(NodeSpec::new("TLStages").with_empty_children())
                .with_child(
                    NodeSpec::new("TLCameras").with_child(
                        NodeSpec::new("Object")
                            .with_attr(Attribute::identifier(MAP_KEY_ATTR, "cam-1"))
                            .with_child(
                                NodeSpec::new("TLCameras")
                                    .with_attr(Attribute::identifier(IDENTIFIER_ATTR, "cam-2"))
                                    .with_attr(Attribute::new("Name", "LSString", "Bad")),
                            ),
                    ),
                )
                .with_child(NodeSpec::new("TLActors").with_empty_children()),
        );
        let err = SceneTree::from_document(doc).unwrap_err();
        assert!(matches!(err, TimelineError::CameraKeyMismatch { .. }));
    }

    #[test]
    fn test_add_stage_skips_duplicates() {
        let mut dest = sample_scene(&[("stage-1", "Wide")], &[], &[]);
        let source = sample_scene(&[("stage-1", "Wide"), ("stage-2", "Close")], &[], &[]);
        for stage in source.stages().to_vec() {
            dest.add_stage(&source, stage.handle).unwrap();
        }
        assert_eq!(dest.stages().len(), 2);
        assert_eq!(dest.stages()[1].identifier, "stage-2");
    }

    #[test]
    fn test_add_camera_copies_new_record() {
        let mut dest = sample_scene(&[], &[], &[]);
        let source = sample_scene(&[], &[("cam-1", "CloseUp A", &["stage-1"])], &[]);
        dest.add_camera(&source, source.cameras()[0].handle).unwrap();
        assert_eq!(dest.cameras().len(), 1);
        assert_eq!(dest.cameras()[0].map_key, "cam-1");
    }

    #[test]
    fn test_add_camera_merges_child_objects() {
        let mut dest = sample_scene(&[], &[("cam-1", "CloseUp A", &["stage-1"])], &[]);
        let source = sample_scene(&[], &[("cam-1", "CloseUp A", &["stage-1", "stage-2"])], &[]);
        dest.add_camera(&source, source.cameras()[0].handle).unwrap();
        assert_eq!(dest.cameras().len(), 1);
        let camera = dest.cameras()[0].camera;
        let group = dest.doc.child_with_id(camera, "Transform").unwrap();
        let keys: Vec<&str> = dest
            .doc
            .children(group)
            .filter_map(|h| dest.doc.attr_value_opt(h, MAP_KEY_ATTR))
            .collect();
        assert_eq!(keys, vec!["stage-1", "stage-2"]);
    }

    #[test]
    fn test_add_actor_skips_templateless_and_merges_transforms() {
        let mut dest = sample_scene(&[], &[], &[("character", Some("tpl-1"), &["stage-1"])]);
        let source = sample_scene(
            &[],
            &[],
            &[
                ("character", Some("tpl-1"), &["stage-1", "stage-2"]),
                ("scenecam", None, &[]),
                ("character", Some("tpl-2"), &[]),
            ],
        );
        for actor in source.actors().to_vec() {
            dest.add_actor(&source, actor.handle).unwrap();
        }
        // templateless actor skipped, tpl-1 merged, tpl-2 appended
        assert_eq!(dest.actors().len(), 2);
        let transforms = dest.actors()[0].transforms.unwrap();
        let keys: Vec<&str> = dest
            .doc
            .children(transforms)
            .filter_map(|h| dest.doc.attr_value_opt(h, MAP_KEY_ATTR))
            .collect();
        assert_eq!(keys, vec!["stage-1", "stage-2"]);
    }

    #[test]
    fn test_retarget_actor_templates() {
        let mut scene = sample_scene(
            &[],
            &[],
            &[
                ("character", Some("tpl-1"), &[]),
                ("character", Some("tpl-other"), &[]),
            ],
        );
        let mut map = HashMap::new();
        map.insert("tpl-1".to_string(), "tpl-new".to_string());
        let touched = scene.retarget_actor_templates(&map).unwrap();
        assert_eq!(touched.len(), 1);
        assert_eq!(scene.actors()[0].template_id.as_deref(), Some("tpl-new"));
        let value = scene.doc.attr_value(touched[0], TEMPLATE_ID_ATTR).unwrap();
        assert_eq!(value, "tpl-new");
    }
}
