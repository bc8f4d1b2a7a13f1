//! Scene-document parsing.
//!
//! The on-disk format is a JSON document with library sections
//! (`geometries`, `materials`, `images`), a flat `nodes` list whose
//! `children` reference other nodes by id, and a `scene` list of root node
//! ids. Triangle corner streams carry one index set per attribute;
//! `-1` (or an omitted set) marks a corner without that attribute.
//!
//! Parsing is a single pass: deserialize, then resolve every internal
//! reference into arena indices. The returned [`SceneGraph`] contains no
//! unresolved name, and a cyclic or over-deep node hierarchy is rejected
//! here rather than discovered during traversal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use cgmath::{Matrix4, SquareMatrix};
use serde::Deserialize;

use super::graph::{ImageDef, MaterialDef, MeshInstance, MeshSource, SceneGraph, SceneNode};
use super::LoadError;

/// Hard bound on node nesting. Anything deeper is treated as authoring
/// error rather than a scene we should attempt to draw.
const MAX_NODE_DEPTH: u32 = 256;

#[derive(Deserialize)]
struct SceneDocument {
    #[serde(default)]
    geometries: Vec<GeometryEntry>,
    #[serde(default)]
    materials: Vec<MaterialEntry>,
    #[serde(default)]
    images: Vec<ImageEntry>,
    #[serde(default)]
    nodes: Vec<NodeEntry>,
    scene: Vec<String>,
}

#[derive(Deserialize)]
struct GeometryEntry {
    id: String,
    #[serde(default)]
    positions: Vec<[f32; 3]>,
    #[serde(default)]
    normals: Vec<[f32; 3]>,
    #[serde(default)]
    texcoords: Vec<[f32; 2]>,
    triangles: TriangleStream,
}

/// Per-attribute index sets over one corner stream. `positions` drives the
/// stream; the optional sets must match its length corner for corner.
#[derive(Deserialize)]
struct TriangleStream {
    positions: Vec<u32>,
    normals: Option<Vec<i64>>,
    texcoords: Option<Vec<i64>>,
}

#[derive(Deserialize)]
struct MaterialEntry {
    id: String,
    #[serde(default)]
    ambient: [f32; 3],
    #[serde(default = "default_diffuse")]
    diffuse: [f32; 3],
    #[serde(default)]
    specular: [f32; 3],
    #[serde(default)]
    shininess: f32,
    texture: Option<String>,
}

fn default_diffuse() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

#[derive(Deserialize)]
struct ImageEntry {
    id: String,
    path: String,
}

#[derive(Deserialize)]
struct NodeEntry {
    id: String,
    /// Row-major 4x4, identity when omitted.
    matrix: Option<[f32; 16]>,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    meshes: Vec<InstanceEntry>,
}

#[derive(Deserialize)]
struct InstanceEntry {
    geometry: String,
    material: String,
}

/// Parses the document at `path` into a fully resolved [`SceneGraph`].
pub fn parse(path: &Path) -> Result<SceneGraph, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::UnreadableSource {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text)
}

/// Parses a document already in memory. Used by [`parse`] and by tests.
pub fn parse_str(text: &str) -> Result<SceneGraph, LoadError> {
    let document: SceneDocument =
        serde_json::from_str(text).map_err(|err| LoadError::MalformedDocument(err.to_string()))?;
    resolve_document(document)
}

fn resolve_document(document: SceneDocument) -> Result<SceneGraph, LoadError> {
    let geometry_ids = index_by_id(&document.geometries, |g| &g.id, "geometry")?;
    let material_ids = index_by_id(&document.materials, |m| &m.id, "material")?;
    let image_ids = index_by_id(&document.images, |i| &i.id, "image")?;
    let node_ids = index_by_id(&document.nodes, |n| &n.id, "node")?;

    let geometries = document
        .geometries
        .into_iter()
        .map(resolve_geometry)
        .collect::<Result<Vec<_>, _>>()?;

    let images = document
        .images
        .into_iter()
        .map(|entry| ImageDef {
            name: entry.id,
            path: PathBuf::from(entry.path),
        })
        .collect();

    let materials = document
        .materials
        .into_iter()
        .map(|entry| {
            if entry.shininess < 0.0 {
                return Err(LoadError::MalformedDocument(format!(
                    "material `{}` has negative shininess {}",
                    entry.id, entry.shininess
                )));
            }
            let image = match entry.texture {
                Some(ref texture) => Some(lookup(&image_ids, texture, || {
                    LoadError::MalformedDocument(format!(
                        "material `{}` references unknown image `{}`",
                        entry.id, texture
                    ))
                })?),
                None => None,
            };
            Ok(MaterialDef {
                name: entry.id,
                ambient: entry.ambient,
                diffuse: entry.diffuse,
                specular: entry.specular,
                shininess: entry.shininess,
                image,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let nodes = document
        .nodes
        .into_iter()
        .map(|entry| {
            let children = entry
                .children
                .iter()
                .map(|child| {
                    lookup(&node_ids, child, || {
                        LoadError::MalformedDocument(format!(
                            "node `{}` references unknown child node `{}`",
                            entry.id, child
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let instances = entry
                .meshes
                .iter()
                .map(|instance| {
                    let geometry = lookup(&geometry_ids, &instance.geometry, || {
                        LoadError::MalformedDocument(format!(
                            "node `{}` references unknown geometry `{}`",
                            entry.id, instance.geometry
                        ))
                    })?;
                    let material = lookup(&material_ids, &instance.material, || {
                        LoadError::UnresolvedMaterialReference(instance.material.clone())
                    })?;
                    Ok(MeshInstance { geometry, material })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SceneNode {
                name: entry.id,
                transform: entry
                    .matrix
                    .map(matrix_from_row_major)
                    .unwrap_or_else(Matrix4::identity),
                children,
                instances,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let roots = document
        .scene
        .iter()
        .map(|root| {
            lookup(&node_ids, root, || {
                LoadError::MalformedDocument(format!("scene references unknown node `{root}`"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    check_hierarchy(&nodes, &roots)?;

    Ok(SceneGraph {
        nodes,
        roots,
        geometries,
        materials,
        images,
    })
}

fn index_by_id<T>(
    entries: &[T],
    id: impl Fn(&T) -> &String,
    kind: &str,
) -> Result<HashMap<String, u32>, LoadError> {
    let mut ids = HashMap::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if ids.insert(id(entry).clone(), index as u32).is_some() {
            return Err(LoadError::MalformedDocument(format!(
                "duplicate {kind} id `{}`",
                id(entry)
            )));
        }
    }
    Ok(ids)
}

fn lookup(
    ids: &HashMap<String, u32>,
    id: &str,
    missing: impl FnOnce() -> LoadError,
) -> Result<u32, LoadError> {
    ids.get(id).copied().ok_or_else(missing)
}

fn resolve_geometry(entry: GeometryEntry) -> Result<MeshSource, LoadError> {
    let corner_count = entry.triangles.positions.len();
    if corner_count % 3 != 0 {
        return Err(LoadError::MalformedDocument(format!(
            "geometry `{}` has a corner stream of length {corner_count}, not a multiple of 3",
            entry.id
        )));
    }

    for &index in &entry.triangles.positions {
        if index as usize >= entry.positions.len() {
            return Err(LoadError::MalformedDocument(format!(
                "geometry `{}` position index {index} out of bounds ({} positions)",
                entry.id,
                entry.positions.len()
            )));
        }
    }

    let normal_indices = resolve_attribute_indices(
        &entry.id,
        "normal",
        entry.triangles.normals,
        corner_count,
        entry.normals.len(),
    )?;
    let texcoord_indices = resolve_attribute_indices(
        &entry.id,
        "texcoord",
        entry.triangles.texcoords,
        corner_count,
        entry.texcoords.len(),
    )?;

    Ok(MeshSource {
        name: entry.id,
        positions: entry.positions,
        normals: entry.normals,
        texcoords: entry.texcoords,
        position_indices: entry.triangles.positions,
        normal_indices,
        texcoord_indices,
    })
}

/// Normalizes one optional attribute index set: checks its length against
/// the corner stream, maps `-1` to `None`, and bounds-checks the rest. An
/// absent set expands to all-`None`.
fn resolve_attribute_indices(
    geometry: &str,
    attribute: &str,
    indices: Option<Vec<i64>>,
    corner_count: usize,
    array_len: usize,
) -> Result<Vec<Option<u32>>, LoadError> {
    let Some(indices) = indices else {
        return Ok(vec![None; corner_count]);
    };
    if indices.len() != corner_count {
        return Err(LoadError::MalformedDocument(format!(
            "geometry `{geometry}` has {} {attribute} indices for {corner_count} corners",
            indices.len()
        )));
    }
    indices
        .into_iter()
        .map(|index| match index {
            -1 => Ok(None),
            index if index >= 0 && (index as usize) < array_len => Ok(Some(index as u32)),
            index => Err(LoadError::MalformedDocument(format!(
                "geometry `{geometry}` {attribute} index {index} out of bounds ({array_len} entries)"
            ))),
        })
        .collect()
}

fn matrix_from_row_major(m: [f32; 16]) -> Matrix4<f32> {
    // cgmath constructors take column-major order.
    Matrix4::new(
        m[0], m[4], m[8], m[12], //
        m[1], m[5], m[9], m[13], //
        m[2], m[6], m[10], m[14], //
        m[3], m[7], m[11], m[15],
    )
}

/// Rejects cycles anywhere in the node graph and over-deep root
/// hierarchies. Diamond sharing (one node instanced under two parents) is
/// allowed; a back edge is not.
fn check_hierarchy(nodes: &[SceneNode], roots: &[u32]) -> Result<(), LoadError> {
    const UNVISITED: u8 = 0;
    const ACTIVE: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNVISITED; nodes.len()];
    let mut height = vec![0u32; nodes.len()];

    for start in 0..nodes.len() {
        if state[start] != UNVISITED {
            continue;
        }
        state[start] = ACTIVE;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if top.1 < nodes[node].children.len() {
                let child = nodes[node].children[top.1] as usize;
                top.1 += 1;
                match state[child] {
                    ACTIVE => {
                        return Err(LoadError::MalformedDocument(format!(
                            "node hierarchy cycle through `{}`",
                            nodes[child].name
                        )));
                    }
                    UNVISITED => {
                        state[child] = ACTIVE;
                        stack.push((child, 0));
                    }
                    _ => {}
                }
            } else {
                height[node] = nodes[node]
                    .children
                    .iter()
                    .map(|&child| height[child as usize] + 1)
                    .max()
                    .unwrap_or(0);
                state[node] = DONE;
                stack.pop();
            }
        }
    }

    for &root in roots {
        if height[root as usize] >= MAX_NODE_DEPTH {
            return Err(LoadError::MalformedDocument(format!(
                "node hierarchy below `{}` exceeds the depth limit of {MAX_NODE_DEPTH}",
                nodes[root as usize].name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_document() -> String {
        r#"{
            "geometries": [{
                "id": "tri",
                "positions": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                "normals": [[0, 0, 1]],
                "texcoords": [[0, 0], [1, 0], [0, 1]],
                "triangles": {
                    "positions": [0, 1, 2],
                    "normals": [0, 0, 0],
                    "texcoords": [0, 1, 2]
                }
            }],
            "materials": [{
                "id": "plain",
                "ambient": [0.1, 0.1, 0.1],
                "diffuse": [0.7, 0.2, 0.2],
                "specular": [1, 1, 1],
                "shininess": 32
            }],
            "nodes": [{
                "id": "root",
                "meshes": [{"geometry": "tri", "material": "plain"}]
            }],
            "scene": ["root"]
        }"#
        .to_string()
    }

    #[test]
    fn parses_minimal_document() {
        let graph = parse_str(&triangle_document()).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.roots, vec![0]);
        assert_eq!(graph.geometries.len(), 1);
        assert_eq!(graph.materials.len(), 1);
        let instance = graph.nodes[0].instances[0];
        assert_eq!(instance.geometry, 0);
        assert_eq!(instance.material, 0);
    }

    #[test]
    fn parsed_geometry_flattens_into_valid_triangle_lists() {
        let graph = parse_str(&triangle_document()).unwrap();
        for geometry in &graph.geometries {
            let mesh = crate::scene::flatten(geometry);
            assert_eq!(mesh.indices.len() % 3, 0);
            for &index in &mesh.indices {
                assert!((index as usize) < mesh.vertices.len());
            }
        }
    }

    #[test]
    fn missing_file_is_unreadable_source() {
        let err = parse(Path::new("/definitely/not/here.scene.json")).unwrap_err();
        assert!(matches!(err, LoadError::UnreadableSource { .. }));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_str("{ not json").unwrap_err();
        assert!(matches!(err, LoadError::MalformedDocument(_)));
    }

    #[test]
    fn unknown_material_is_unresolved_reference() {
        let text = triangle_document().replace(r#""material": "plain""#, r#""material": "gold""#);
        let err = parse_str(&text).unwrap_err();
        match err {
            LoadError::UnresolvedMaterialReference(name) => assert_eq!(name, "gold"),
            other => panic!("expected UnresolvedMaterialReference, got {other:?}"),
        }
    }

    #[test]
    fn unknown_geometry_is_malformed() {
        let text = triangle_document().replace(r#""geometry": "tri""#, r#""geometry": "box""#);
        let err = parse_str(&text).unwrap_err();
        assert!(matches!(err, LoadError::MalformedDocument(_)));
    }

    #[test]
    fn cyclic_hierarchy_is_rejected() {
        let text = r#"{
            "nodes": [
                {"id": "a", "children": ["b"]},
                {"id": "b", "children": ["a"]}
            ],
            "scene": ["a"]
        }"#;
        let err = parse_str(text).unwrap_err();
        match err {
            LoadError::MalformedDocument(message) => assert!(message.contains("cycle")),
            other => panic!("expected MalformedDocument, got {other:?}"),
        }
    }

    #[test]
    fn self_cycle_is_rejected() {
        let text = r#"{
            "nodes": [{"id": "a", "children": ["a"]}],
            "scene": ["a"]
        }"#;
        assert!(matches!(
            parse_str(text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn diamond_sharing_is_allowed() {
        let text = r#"{
            "nodes": [
                {"id": "root", "children": ["left", "right"]},
                {"id": "left", "children": ["shared"]},
                {"id": "right", "children": ["shared"]},
                {"id": "shared"}
            ],
            "scene": ["root"]
        }"#;
        let graph = parse_str(text).unwrap();
        assert_eq!(graph.nodes.len(), 4);
    }

    #[test]
    fn over_deep_hierarchy_is_rejected() {
        let count = MAX_NODE_DEPTH as usize + 2;
        let nodes = (0..count)
            .map(|i| {
                if i + 1 < count {
                    format!(r#"{{"id": "n{i}", "children": ["n{}"]}}"#, i + 1)
                } else {
                    format!(r#"{{"id": "n{i}"}}"#)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let text = format!(r#"{{"nodes": [{nodes}], "scene": ["n0"]}}"#);
        match parse_str(&text).unwrap_err() {
            LoadError::MalformedDocument(message) => assert!(message.contains("depth")),
            other => panic!("expected MalformedDocument, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let text = r#"{
            "nodes": [{"id": "a"}, {"id": "a"}],
            "scene": ["a"]
        }"#;
        assert!(matches!(
            parse_str(text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn out_of_bounds_position_index_is_rejected() {
        let text = triangle_document().replace(r#""positions": [0, 1, 2]"#, r#""positions": [0, 1, 9]"#);
        assert!(matches!(
            parse_str(&text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn partial_corner_stream_is_rejected() {
        let text = triangle_document().replace(r#""positions": [0, 1, 2]"#, r#""positions": [0, 1]"#);
        assert!(matches!(
            parse_str(&text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn mismatched_attribute_stream_is_rejected() {
        let text = triangle_document().replace(r#""normals": [0, 0, 0]"#, r#""normals": [0, 0]"#);
        assert!(matches!(
            parse_str(&text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn negative_corner_index_becomes_sentinel() {
        let text = triangle_document().replace(r#""normals": [0, 0, 0]"#, r#""normals": [0, -1, 0]"#);
        let graph = parse_str(&text).unwrap();
        assert_eq!(
            graph.geometries[0].normal_indices,
            vec![Some(0), None, Some(0)]
        );
    }

    #[test]
    fn negative_shininess_is_rejected() {
        let text = triangle_document().replace(r#""shininess": 32"#, r#""shininess": -1"#);
        assert!(matches!(
            parse_str(&text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn unknown_texture_image_is_malformed() {
        let text = triangle_document().replace(
            r#""shininess": 32"#,
            r#""shininess": 32, "texture": "missing-image""#,
        );
        assert!(matches!(
            parse_str(&text).unwrap_err(),
            LoadError::MalformedDocument(_)
        ));
    }

    #[test]
    fn row_major_translation_lands_in_last_column() {
        let text = r#"{
            "nodes": [{
                "id": "root",
                "matrix": [1, 0, 0, 5,
                           0, 1, 0, 6,
                           0, 0, 1, 7,
                           0, 0, 0, 1]
            }],
            "scene": ["root"]
        }"#;
        let graph = parse_str(text).unwrap();
        let transform = graph.nodes[0].transform;
        assert_eq!(transform.w.x, 5.0);
        assert_eq!(transform.w.y, 6.0);
        assert_eq!(transform.w.z, 7.0);
    }
}
