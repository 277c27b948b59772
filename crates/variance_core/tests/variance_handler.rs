use variance_core::{
    CategoryError, CategoryRecord, CategoryTree, ErrorKind, IndexError, JsonConfigRepository,
    LayeredDocument, MemoryDocument, MemoryDocumentOpener, MemoryLayer, SearchMode,
    VarianceError, VarianceHandler, VisibilityMode,
};

const NO_PARENTS: &[&str] = &[];

/// Path identifiers (topmost sibling first):
/// `0` Hat, `1` Face, `1-0` Eyes, `1-0-0` EyesClosed, `1-0-1` EyesOpen,
/// `1-1` Mouth, `2` Body, `2-0` Arms, `2-1` Legs, `2-2` Torso, `3` Background.
fn sample_document() -> MemoryDocument {
    MemoryDocument::new(vec![
        MemoryLayer::leaf("Background"),
        MemoryLayer::group(
            "Body",
            vec![
                MemoryLayer::leaf("Torso"),
                MemoryLayer::leaf("Legs"),
                MemoryLayer::leaf("Arms"),
            ],
        ),
        MemoryLayer::group(
            "Face",
            vec![
                MemoryLayer::leaf("Mouth"),
                MemoryLayer::group(
                    "Eyes",
                    vec![MemoryLayer::leaf("EyesOpen"), MemoryLayer::leaf("EyesClosed")],
                ),
            ],
        ),
        MemoryLayer::leaf("Hat"),
    ])
}

fn handler() -> VarianceHandler<MemoryDocument> {
    VarianceHandler::from_parts(CategoryTree::default(), "sample.json", sample_document()).unwrap()
}

fn snapshot(handler: &VarianceHandler<MemoryDocument>) -> CategoryRecord {
    handler.tree().to_record(handler.tree().root()).unwrap()
}

#[test]
fn index_assigns_reversed_sibling_paths() {
    let handler = handler();
    let index = handler.index();

    assert_eq!(index.get("0").unwrap().name, "Hat");
    assert_eq!(index.get("1-0").unwrap().name, "Eyes");
    assert_eq!(index.get("1-0-1").unwrap().name, "EyesOpen");
    assert_eq!(index.get("2-2").unwrap().name, "Torso");
    assert_eq!(index.get("3").unwrap().name, "Background");
    assert_eq!(index.len(), 11);
}

#[test]
fn parse_layer_expands_groups_and_accepts_display_names() {
    let handler = handler();
    let index = handler.index();

    let ids = index.parse_layer(["Body", "1-0-1", "Hat", "Arms"]).unwrap();
    assert_eq!(
        ids.into_iter().collect::<Vec<_>>(),
        vec!["2-0", "2-1", "2-2", "1-0-1", "0"]
    );

    let nested = index.parse_layer(["1"]).unwrap();
    assert_eq!(nested.into_iter().collect::<Vec<_>>(), vec!["1-0-0", "1-0-1", "1-1"]);

    let err = index.parse_layer(["Tail"]).unwrap_err();
    assert_eq!(err, IndexError::LayerNotFound("Tail".to_string()));
}

#[test]
fn duplicate_layer_names_fail_at_load() {
    let document = MemoryDocument::new(vec![
        MemoryLayer::leaf("Line"),
        MemoryLayer::group("Sketch", vec![MemoryLayer::leaf("Line")]),
    ]);
    let err = VarianceHandler::from_parts(CategoryTree::default(), "dup.json", document)
        .err()
        .unwrap();

    assert!(matches!(
        err,
        VarianceError::Index(IndexError::DuplicateLayerNames(ref names)) if names == &["Line"]
    ));
    assert_eq!(err.kind(), ErrorKind::Invariant);
}

#[test]
fn duplicate_sibling_categories_fail_at_load() {
    let record: CategoryRecord = serde_json::from_value(serde_json::json!({
        "name": "root",
        "mode": "all",
        "subcategories": [
            [{ "name": "Pose", "mode": "unk", "subcategories": [], "layers": [] }, true],
            [{ "name": "Pose", "mode": "unk", "subcategories": [], "layers": [] }, true]
        ],
        "layers": []
    }))
    .unwrap();
    let tree = CategoryTree::from_record(&record).unwrap();

    let err = VarianceHandler::from_parts(tree, "sample.json", sample_document())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        VarianceError::Index(IndexError::DuplicateCategoryNames { ref parent, .. }) if parent == "root"
    ));
}

#[test]
fn category_names_must_not_collide_with_document_names() {
    let mut handler = handler();
    let before = snapshot(&handler);

    let err = handler
        .add_category("root", NO_PARENTS, "Hat", VisibilityMode::Unk)
        .unwrap_err();
    assert!(matches!(err, VarianceError::Index(IndexError::NameTaken(ref name)) if name == "Hat"));
    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert_eq!(snapshot(&handler), before);

    handler
        .add_category("root", NO_PARENTS, "Outfit", VisibilityMode::Unk)
        .unwrap();
    let err = handler
        .rename_category("Outfit", NO_PARENTS, "Torso")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invariant);
    handler
        .rename_category("Outfit", NO_PARENTS, "Clothes")
        .unwrap();
    assert!(handler.tree().get_sub(handler.tree().root(), "Clothes").is_some());
}

#[test]
fn category_names_must_not_collide_with_layer_identifiers() {
    let mut handler = handler();
    let before = snapshot(&handler);

    let err = handler
        .add_category("root", NO_PARENTS, "0", VisibilityMode::Unk)
        .unwrap_err();
    assert!(matches!(err, VarianceError::Index(IndexError::PathIdTaken(ref name)) if name == "0"));
    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert_eq!(snapshot(&handler), before);

    handler
        .add_category("root", NO_PARENTS, "Extras", VisibilityMode::All)
        .unwrap();
    handler.add_layer("Extras", NO_PARENTS, "3").unwrap();
    let err = handler
        .rename_category("Extras", NO_PARENTS, "1-0")
        .unwrap_err();
    assert!(matches!(err, VarianceError::Index(IndexError::PathIdTaken(_))));
    assert_eq!(
        handler.render_specific(&["Extras"], true).unwrap(),
        vec!["Background"]
    );

    let before = snapshot(&handler);
    let err = handler.import_outline("all:root:Spare 2-1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert_eq!(snapshot(&handler), before);
}

#[test]
fn root_name_is_reserved_for_the_root() {
    let mut handler = handler();
    let err = handler
        .add_category("root", NO_PARENTS, "root", VisibilityMode::Unk)
        .unwrap_err();
    assert!(matches!(err, VarianceError::Index(IndexError::RootNameTaken(_))));

    handler
        .add_category("root", NO_PARENTS, "Outfit", VisibilityMode::Unk)
        .unwrap();
    assert!(handler
        .rename_category("Outfit", NO_PARENTS, "root")
        .is_err());
    let outfit = handler.tree().subcategories(handler.tree().root()).unwrap()[0];
    assert_eq!(handler.tree().name(outfit).unwrap(), "Outfit");
}

#[test]
fn layer_references_must_be_unclaimed_path_identifiers() {
    let mut handler = handler();
    handler
        .add_category("root", NO_PARENTS, "Outfit", VisibilityMode::Unk)
        .unwrap();
    let before = snapshot(&handler);

    let err = handler.add_layer("Outfit", NO_PARENTS, "Body").unwrap_err();
    assert!(matches!(err, VarianceError::Index(IndexError::NameTaken(_))));
    let err = handler.add_layer("Outfit", NO_PARENTS, "9-9").unwrap_err();
    assert!(matches!(err, VarianceError::Index(IndexError::LayerNotFound(_))));
    assert_eq!(snapshot(&handler), before);

    handler.add_layer("Outfit", NO_PARENTS, "2").unwrap();
    let err = handler.add_layer("Outfit", NO_PARENTS, "2").unwrap_err();
    assert!(matches!(err, VarianceError::Category(CategoryError::DuplicateName { .. })));
}

#[test]
fn group_reference_expands_to_every_leaf_and_renders() {
    let mut handler = handler();
    handler
        .add_category("root", NO_PARENTS, "Outfit", VisibilityMode::Unk)
        .unwrap();
    handler
        .change_mode("Outfit", NO_PARENTS, VisibilityMode::All)
        .unwrap();
    handler.add_layer("Outfit", NO_PARENTS, "2").unwrap();

    let ids = handler.visible_layer_ids().unwrap();
    assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["2-0", "2-1", "2-2"]);

    let image = handler.render().unwrap();
    assert_eq!(image, vec!["Arms", "Legs", "Torso"]);
}

#[test]
fn expression_switch_changes_rendered_leaves() {
    let mut handler = handler();
    handler
        .add_category("root", NO_PARENTS, "Expression", VisibilityMode::Unk)
        .unwrap();
    handler
        .change_mode("Expression", NO_PARENTS, VisibilityMode::One)
        .unwrap();
    handler.add_layer("Expression", NO_PARENTS, "1-0-1").unwrap();
    handler.add_layer("Expression", NO_PARENTS, "1-0-0").unwrap();
    assert_eq!(handler.render().unwrap(), vec!["EyesOpen"]);

    handler.reverse_visibility("1-0-0", &["Expression"]).unwrap();
    assert_eq!(handler.render().unwrap(), vec!["EyesClosed"]);

    handler.reverse_visibility("1-0-0", &["Expression"]).unwrap();
    assert_eq!(handler.render().unwrap(), vec!["EyesOpen"]);

    let err = handler
        .reverse_visibility("1-0-1", &["Expression"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);
    assert_eq!(handler.render().unwrap(), vec!["EyesOpen"]);
}

#[test]
fn shared_leaf_reached_twice_is_rendered_once() {
    let mut handler = handler();
    for name in ["Casual", "Formal"] {
        handler
            .add_category("root", NO_PARENTS, name, VisibilityMode::Unk)
            .unwrap();
        handler
            .change_mode(name, NO_PARENTS, VisibilityMode::All)
            .unwrap();
        handler.add_layer(name, NO_PARENTS, "0").unwrap();
    }

    let ids = handler.visible_layer_ids().unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(handler.render().unwrap(), vec!["Hat"]);
}

#[test]
fn copy_document_leaves_original_untouched() {
    let mut original = sample_document();
    original.root.children.as_mut().unwrap()[0].visible = false;
    let handler =
        VarianceHandler::from_parts(CategoryTree::default(), "sample.json", original.clone())
            .unwrap();

    let ids = handler.index().parse_layer(["3", "Mouth"]).unwrap();
    let copy = handler.copy_document(&ids);

    assert_eq!(handler.document(), &original);
    assert_eq!(copy.composite(true).unwrap(), vec!["Mouth", "Background"]);
    assert!(copy.root.children.as_ref().unwrap()[1].visible);
}

#[test]
fn render_specific_mixes_identifiers_and_categories() {
    let mut handler = handler();
    handler
        .add_category("root", NO_PARENTS, "Extras", VisibilityMode::Unk)
        .unwrap();
    handler
        .change_mode("Extras", NO_PARENTS, VisibilityMode::Or)
        .unwrap();
    handler.add_layer("Extras", NO_PARENTS, "1-1").unwrap();
    handler.add_layer("Extras", NO_PARENTS, "3").unwrap();
    handler.set_visibility("3", &["Extras"], true).unwrap();

    let visible = handler.render_specific(&["0", "Extras"], true).unwrap();
    assert_eq!(visible, vec!["Hat", "Background"]);

    let everything = handler.render_specific(&["Extras"], false).unwrap();
    assert_eq!(everything, vec!["Mouth", "Background"]);
}

#[test]
fn category_operations_reject_layer_targets() {
    let mut handler = handler();
    handler
        .add_category("root", NO_PARENTS, "Extras", VisibilityMode::Unk)
        .unwrap();
    handler.add_layer("Extras", NO_PARENTS, "0").unwrap();
    let parents = ["Extras"];

    let err = handler.delete_category("0", &parents).unwrap_err();
    assert!(matches!(err, VarianceError::TargetIsLayer { .. }));
    assert_eq!(err.kind(), ErrorKind::NotAllowed);

    let err = handler
        .change_mode("0", &parents, VisibilityMode::Or)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);

    let err = handler
        .add_category("0", &parents, "Brim", VisibilityMode::Unk)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);

    let err = handler.rename_category("0", &parents, "Cap").unwrap_err();
    assert!(matches!(err, VarianceError::Category(CategoryError::LayerRename(_))));

    let err = handler.change_mode("Ghost", NO_PARENTS, VisibilityMode::Or).unwrap_err();
    assert!(matches!(err, VarianceError::TargetNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::Invariant);

    let err = handler
        .change_mode("Extras", NO_PARENTS, VisibilityMode::Unk)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);
}

#[test]
fn delete_operations_remove_members() {
    let mut handler = handler();
    handler
        .add_category("root", NO_PARENTS, "Face Set", VisibilityMode::Unk)
        .unwrap();
    handler
        .add_category("Face Set", NO_PARENTS, "Left", VisibilityMode::Unk)
        .unwrap();
    handler.add_layer("Left", &["Face Set"], "1-1").unwrap();

    handler.delete_layer("1-1", &["Face Set", "Left"]).unwrap();
    let left = handler
        .get_categories(&["Face Set", "Left"], SearchMode::Path)
        .unwrap()[1];
    assert!(handler.tree().layers(left).unwrap().is_empty());
    assert_eq!(
        handler
            .get_categories_at("Face Set-Left", SearchMode::Path)
            .unwrap(),
        handler
            .get_categories(&["Face Set", "Left"], SearchMode::Path)
            .unwrap()
    );

    let err = handler.delete_layer("1-1", &["Face Set", "Left"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAllowed);

    handler.delete_category("Left", &["Face Set"]).unwrap();
    assert!(!handler.tree().contains(left));
    let err = handler.delete_category("Left", &["Face Set"]).unwrap_err();
    assert!(matches!(
        err,
        VarianceError::Category(CategoryError::MissingReference { ref name, .. }) if name == "Left"
    ));
    assert_eq!(err.kind(), ErrorKind::NotAllowed);
    assert!(handler
        .get_categories(&["Left"], SearchMode::DepthFirst)
        .is_err());
}

#[test]
fn outline_lists_document_or_subtree() {
    let handler = handler();

    let whole = handler.outline(None).unwrap();
    assert_eq!(whole.children.len(), 4);
    assert_eq!(whole.children[3].name, "Hat");

    let eyes = handler.outline(Some("1-0")).unwrap();
    assert_eq!(eyes.name, "Eyes");
    let names: Vec<_> = eyes.children.iter().map(|child| child.name.as_str()).collect();
    assert_eq!(names, vec!["EyesOpen", "EyesClosed"]);

    assert!(handler.outline(Some("7")).is_err());
}

#[test]
fn outline_import_builds_categories() {
    let mut handler = handler();
    let created = handler
        .import_outline("all:root:Outfit Expression\nall:Outfit:Top Bottom\none：Expression：Smile Frown\n")
        .unwrap();
    assert_eq!(created, 6);

    let tree = handler.tree();
    let chain = tree.resolve_path(&["Expression"]).unwrap();
    assert_eq!(tree.mode(chain[0]).unwrap(), VisibilityMode::One);
    assert_eq!(tree.visibilities(chain[0]).unwrap(), vec![true, false]);
    let outfit = tree.resolve_path(&["Outfit"]).unwrap()[0];
    assert_eq!(tree.visibilities(outfit).unwrap(), vec![true, true]);
    tree.check_tree().unwrap();
}

#[test]
fn failed_outline_import_leaves_tree_unchanged() {
    let mut handler = handler();
    let before = snapshot(&handler);

    let err = handler
        .import_outline("all:root:Shoes\nor:Missing:Lace")
        .unwrap_err();
    assert!(matches!(err, VarianceError::TargetNotFound { .. }));
    assert_eq!(snapshot(&handler), before);

    let err = handler.import_outline("or:root:Shoes").unwrap_err();
    assert!(matches!(err, VarianceError::RootModeMustBeAll(VisibilityMode::Or)));

    handler.import_outline("one:root:Shoes").unwrap_err();
    handler.import_outline("all:root:Shoes\nor:Shoes:Lace").unwrap();
    let err = handler.import_outline("one:Shoes:Sole").unwrap_err();
    assert!(matches!(err, VarianceError::ModeMismatch { .. }));
}

#[test]
fn config_save_and_reload_restores_state() {
    let dir = tempfile::tempdir().unwrap();
    let document_path = dir.path().join("sample.json");
    let config_path = dir.path().join("vh_config.json");
    std::fs::write(
        &document_path,
        serde_json::to_string(&sample_document()).unwrap(),
    )
    .unwrap();

    let mut handler = VarianceHandler::new(&document_path, &MemoryDocumentOpener).unwrap();
    handler
        .add_category("root", NO_PARENTS, "Extras", VisibilityMode::Unk)
        .unwrap();
    handler
        .change_mode("Extras", NO_PARENTS, VisibilityMode::Or)
        .unwrap();
    handler.add_layer("Extras", NO_PARENTS, "0").unwrap();
    handler.reverse_visibility("0", &["Extras"]).unwrap();
    handler
        .save_config(&config_path, &JsonConfigRepository)
        .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
    assert_eq!(raw["_layer_count"], 11);
    assert_eq!(raw["_layer_dict"]["2-1"], "Legs");

    let reloaded: VarianceHandler<MemoryDocument> =
        VarianceHandler::from_config(&config_path, &JsonConfigRepository, &MemoryDocumentOpener)
            .unwrap();
    assert_eq!(reloaded.psd_path(), document_path.as_path());
    assert_eq!(reloaded.to_config().unwrap(), handler.to_config().unwrap());
    assert_eq!(reloaded.render().unwrap(), vec!["Hat"]);
}

#[test]
fn reload_fails_when_document_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = VarianceHandler::new(dir.path().join("absent.json"), &MemoryDocumentOpener)
        .err()
        .unwrap();
    assert!(matches!(err, VarianceError::Document(_)));
    assert_eq!(err.kind(), ErrorKind::Invariant);
}
