// ABOUTME: scaffolds projects from bundled templates: directories sequentially in
// ABOUTME: depth-first order, then the files of each level in parallel through FileOps.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use warden_common::{
    CreateFileRequest, CreatedEntry, CreatedEntryKind, GenerateProjectOutcome,
    GenerateProjectRequest, TemplateInfo,
};

use crate::actions::files::FileOps;
use crate::config::Config;
use crate::error::OpError;
use crate::policy::resolve_in_workspace;

/// A template tree: string leaves are file contents, mappings are
/// subdirectories.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemplateNode {
    File(String),
    Dir(BTreeMap<String, TemplateNode>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub structure: BTreeMap<String, TemplateNode>,
}

impl Template {
    fn counts(&self) -> (usize, usize) {
        fn walk(nodes: &BTreeMap<String, TemplateNode>, dirs: &mut usize, files: &mut usize) {
            for node in nodes.values() {
                match node {
                    TemplateNode::File(_) => *files += 1,
                    TemplateNode::Dir(children) => {
                        *dirs += 1;
                        walk(children, dirs, files);
                    }
                }
            }
        }
        let (mut dirs, mut files) = (0, 0);
        walk(&self.structure, &mut dirs, &mut files);
        (dirs, files)
    }
}

/// Bundled templates, loaded once at start; the content is opaque data.
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn bundled() -> anyhow::Result<Self> {
        let sources = [
            include_str!("../../templates/react-app.json"),
            include_str!("../../templates/node-api.json"),
            include_str!("../../templates/static-site.json"),
        ];
        let templates = sources
            .iter()
            .map(|source| serde_json::from_str(source))
            .collect::<Result<Vec<Template>, _>>()?;
        Ok(Self { templates })
    }

    pub fn list(&self) -> Vec<TemplateInfo> {
        self.templates
            .iter()
            .map(|t| {
                let (directories, files) = t.counts();
                TemplateInfo {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    description: t.description.clone(),
                    directories,
                    files,
                }
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }
}

pub struct TemplateGenerator {
    cfg: Arc<Config>,
    files: Arc<FileOps>,
    registry: TemplateRegistry,
}

impl TemplateGenerator {
    pub fn new(cfg: Arc<Config>, files: Arc<FileOps>, registry: TemplateRegistry) -> Self {
        Self {
            cfg,
            files,
            registry,
        }
    }

    pub fn list(&self) -> Vec<TemplateInfo> {
        self.registry.list()
    }

    pub async fn generate(
        &self,
        req: &GenerateProjectRequest,
    ) -> Result<GenerateProjectOutcome, OpError> {
        let template = self
            .registry
            .get(&req.template_id)
            .ok_or_else(|| OpError::UnknownTemplate(req.template_id.clone()))?;

        let (project_abs, project_rel) = resolve_in_workspace(&self.cfg, &req.project_name)?;
        if tokio::fs::metadata(&project_abs).await.is_ok() {
            return Err(OpError::ProjectExists(project_rel));
        }

        // phase one: every directory, sequentially, parents before children
        let mut directories = vec![project_rel.clone()];
        collect_directories(&template.structure, &project_rel, &mut directories);
        for dir in &directories {
            let (abs, _) = resolve_in_workspace(&self.cfg, dir)?;
            tokio::fs::create_dir(&abs).await?;
        }

        // phase two: the files of each level, in parallel, shallowest first
        let mut files_by_level: BTreeMap<usize, Vec<(String, &String)>> = BTreeMap::new();
        collect_files(&template.structure, &project_rel, 0, &mut files_by_level);

        let mut entries: Vec<CreatedEntry> = directories
            .iter()
            .map(|path| CreatedEntry {
                kind: CreatedEntryKind::Directory,
                path: path.clone(),
                size: None,
            })
            .collect();
        let mut files_created = 0;

        for (_, level_files) in files_by_level {
            let writes = level_files.into_iter().map(|(path, content)| {
                let files = self.files.clone();
                let request = CreateFileRequest {
                    file_path: path,
                    content: content.clone(),
                    overwrite: false,
                };
                async move { files.create(&request).await }
            });
            for outcome in join_all(writes).await {
                let outcome = outcome?;
                files_created += 1;
                entries.push(CreatedEntry {
                    kind: CreatedEntryKind::File,
                    path: outcome.path,
                    size: Some(outcome.bytes_written),
                });
            }
        }

        tracing::info!(
            "🏗 generated {} from {} ({} dirs, {} files)",
            project_rel,
            template.id,
            directories.len(),
            files_created
        );
        Ok(GenerateProjectOutcome {
            template_id: template.id.clone(),
            project_name: req.project_name.clone(),
            directories_created: directories.len(),
            files_created,
            entries,
        })
    }
}

fn collect_directories(
    nodes: &BTreeMap<String, TemplateNode>,
    prefix: &str,
    out: &mut Vec<String>,
) {
    for (name, node) in nodes {
        if let TemplateNode::Dir(children) = node {
            let path = format!("{prefix}/{name}");
            out.push(path.clone());
            collect_directories(children, &path, out);
        }
    }
}

fn collect_files<'a>(
    nodes: &'a BTreeMap<String, TemplateNode>,
    prefix: &str,
    level: usize,
    out: &mut BTreeMap<usize, Vec<(String, &'a String)>>,
) {
    for (name, node) in nodes {
        let path = format!("{prefix}/{name}");
        match node {
            TemplateNode::File(content) => {
                out.entry(level).or_default().push((path, content));
            }
            TemplateNode::Dir(children) => collect_files(children, &path, level + 1, out),
        }
    }
}
