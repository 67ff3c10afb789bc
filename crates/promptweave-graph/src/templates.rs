//! Canonical job-graph snippets.
//!
//! Loader templates wrap an uploaded input asset so the job graph can read
//! it; save templates append a terminal export node for each declared
//! output type. Keys are fragment-local and get namespaced during merging.

use std::collections::BTreeMap;

use crate::job::{link, JobNode};

/// Loads an uploaded image.
pub fn image_load(remote_name: &str) -> BTreeMap<String, JobNode> {
    BTreeMap::from([(
        "0".to_string(),
        JobNode::new("LoadImage", "Load Image").with_input("image", remote_name),
    )])
}

/// Loads an uploaded image and converts its red channel into a mask.
pub fn mask_load(remote_name: &str) -> BTreeMap<String, JobNode> {
    BTreeMap::from([
        (
            "1".to_string(),
            JobNode::new("LoadImage", "Load Image").with_input("image", remote_name),
        ),
        (
            "0".to_string(),
            JobNode::new("ImageToMask", "Convert Image to Mask")
                .with_input("image", link("1", 0))
                .with_input("channel", "red"),
        ),
    ])
}

/// Appends an image save node.
pub fn image_save(prefix: &str, key: &str, sort_order: usize) -> BTreeMap<String, JobNode> {
    BTreeMap::from([(
        key.to_string(),
        JobNode::new("SaveImage", "Save Image")
            .with_input("filename_prefix", prefix)
            .with_sort_order(sort_order),
    )])
}

/// Converts a mask to an image and appends an image save node.
pub fn mask_save(prefix: &str, key: &str, sort_order: usize) -> BTreeMap<String, JobNode> {
    BTreeMap::from([
        (key.to_string(), JobNode::new("MaskToImage", "Mask to Image")),
        (
            format!("{key}0"),
            JobNode::new("SaveImage", "Save Image")
                .with_input("images", link(key, 0))
                .with_input("filename_prefix", prefix)
                .with_sort_order(sort_order),
        ),
    ])
}

/// Appends a mesh export node.
pub fn mesh_save(prefix: &str, key: &str, sort_order: usize) -> BTreeMap<String, JobNode> {
    BTreeMap::from([(
        key.to_string(),
        JobNode::new("SaveGLB", "Save Mesh")
            .with_input("filename_prefix", prefix)
            .with_sort_order(sort_order),
    )])
}

/// Exports a textured mesh and previews its path as an image through the
/// companion extension node.
pub fn trimesh_save(
    prefix: &str,
    input_key: &str,
    key: &str,
    sort_order: usize,
) -> BTreeMap<String, JobNode> {
    BTreeMap::from([
        (
            input_key.to_string(),
            JobNode::new("Hy3DExportMesh", "Save Mesh")
                .with_input("filename_prefix", prefix)
                .with_input("file_format", "glb")
                .with_input("save_file", false),
        ),
        (
            key.to_string(),
            JobNode::new("StringAsImage", "Preview Mesh As Image")
                .with_input("image_path", link(input_key, 0))
                .with_sort_order(sort_order),
        ),
    ])
}

/// Renders a string output into an image through the companion extension.
pub fn string_save(key: &str, sort_order: usize) -> BTreeMap<String, JobNode> {
    BTreeMap::from([(
        key.to_string(),
        JobNode::new("StringAsImage", "Preview String As Image").with_sort_order(sort_order),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::as_link;

    #[test]
    fn test_mask_load_wires_internally() {
        let graph = mask_load("promptweave/abc.png");
        assert_eq!(graph.len(), 2);
        assert_eq!(as_link(&graph["0"].inputs["image"]), Some(("1", 0)));
        assert_eq!(graph["1"].inputs["image"], "promptweave/abc.png");
    }

    #[test]
    fn test_save_templates_stamp_sort_order() {
        assert_eq!(image_save("p", "3", 3)["3"].meta.sort_order, Some(3));
        assert_eq!(mask_save("p", "3", 3)["30"].meta.sort_order, Some(3));
        assert_eq!(mesh_save("p", "3", 3)["3"].meta.sort_order, Some(3));
        assert_eq!(trimesh_save("p", "input1_3", "3", 3)["3"].meta.sort_order, Some(3));
        assert_eq!(string_save("3", 3)["3"].meta.sort_order, Some(3));
    }
}
