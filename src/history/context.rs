//! Attached prompt context of a single generator.

use std::collections::BTreeMap;

use super::MessageHistoryBuilder;
use crate::collab::GenerationConfig;
use crate::error::{KernelError, KernelResult};
use crate::store::GraphStore;
use crate::traversal::oldest_first;
use crate::types::{
    AttachedFile, ContentBlock, GithubData, GraphId, Message, NodeData, NodeId, NodeRecord, Role,
};

/// The user turn a generator's attached prompt nodes add up to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachedContext {
    /// Number of prompt-like nodes found.
    pub prompt_nodes: usize,
    /// PROMPT texts, then GITHUB renderings, chronological.
    pub text: String,
    /// FILE_PROMPT attachments.
    pub blocks: Vec<ContentBlock>,
}

impl AttachedContext {
    /// Whether the generator has no attached prompt nodes at all.
    pub fn is_empty(&self) -> bool {
        self.prompt_nodes == 0
    }

    /// The user message for this context.
    pub fn into_message(self) -> Message {
        let mut content = Vec::with_capacity(self.blocks.len() + 1);
        if !self.text.is_empty() || self.blocks.is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }
        content.extend(self.blocks);
        Message {
            role: Role::User,
            content,
            metadata: None,
        }
    }
}

fn file_block(file: &AttachedFile, include_content: bool) -> ContentBlock {
    let data = if include_content { file.content.clone() } else { None };
    if file.is_image() {
        ContentBlock::Image {
            file_id: file.id.clone(),
            mime_type: file.mime_type.clone(),
            data,
        }
    } else {
        ContentBlock::File {
            file_id: file.id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            data,
        }
    }
}

fn render_repo_file(repo: &GithubData, path: &str, content: &str) -> String {
    format!("File: {}/{} ({})\n```\n{}\n```", repo.repo, path, repo.branch, content)
}

impl<S: GraphStore + 'static> MessageHistoryBuilder<S> {
    /// Resolve the prompt-like nodes attached to `generator_id` into one
    /// user turn.
    ///
    /// Prompt texts come first (oldest first, blank-line separated), then
    /// repository files, then file attachments as separate content blocks.
    pub async fn attached_context(
        &self,
        graph_id: &GraphId,
        generator_id: &NodeId,
        generation: GenerationConfig,
        include_file_content: bool,
    ) -> KernelResult<AttachedContext> {
        let prompts = oldest_first(
            self.traversal
                .get_connected_prompt_nodes(graph_id, generator_id)
                .await?,
        );
        if prompts.is_empty() {
            return Ok(AttachedContext::default());
        }

        let ids: Vec<NodeId> = prompts.iter().map(|p| p.id.clone()).collect();
        let records: BTreeMap<NodeId, NodeRecord> = self
            .traversal
            .store()
            .get_nodes_by_ids(graph_id, &ids)
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut texts: Vec<String> = Vec::new();
        let mut repo_texts: Vec<String> = Vec::new();
        let mut blocks: Vec<ContentBlock> = Vec::new();

        for id in &ids {
            let record = records.get(id).ok_or_else(|| KernelError::not_found("node", id))?;
            match NodeData::from_record(record)? {
                NodeData::Prompt(data) => {
                    if !data.prompt.is_empty() {
                        texts.push(data.prompt);
                    }
                }
                NodeData::Github(data) => {
                    repo_texts.extend(self.render_repository(&data, generation.github_auto_pull).await?);
                }
                NodeData::FilePrompt(data) => {
                    blocks.extend(data.files.iter().map(|f| file_block(f, include_file_content)));
                }
                _ => {}
            }
        }

        texts.extend(repo_texts);
        Ok(AttachedContext {
            prompt_nodes: ids.len(),
            text: texts.join("\n\n"),
            blocks,
        })
    }

    async fn render_repository(&self, data: &GithubData, auto_pull: bool) -> KernelResult<Vec<String>> {
        let mirror = match (&self.mirror, auto_pull) {
            (Some(mirror), true) => {
                mirror.pull(&data.repo, &data.branch).await?;
                Some(mirror)
            }
            (None, true) => {
                tracing::warn!(
                    repo = %data.repo,
                    branch = %data.branch,
                    "Auto-pull requested but no repository mirror configured; using saved content"
                );
                None
            }
            _ => None,
        };

        let mut rendered = Vec::with_capacity(data.files.len());
        for file in &data.files {
            let content = match mirror {
                Some(mirror) => Some(mirror.read_file(&data.repo, &data.branch, &file.path).await?),
                None => file.content.clone(),
            };
            match content {
                Some(content) => rendered.push(render_repo_file(data, &file.path, &content)),
                None => tracing::debug!(repo = %data.repo, path = %file.path, "Repository file has no saved content"),
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_and_file_blocks() {
        let image = AttachedFile {
            id: "f1".into(),
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            content: Some("aGk=".into()),
        };
        assert_eq!(
            file_block(&image, false),
            ContentBlock::Image { file_id: "f1".into(), mime_type: "image/png".into(), data: None }
        );

        let pdf = AttachedFile {
            id: "f2".into(),
            name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            content: Some("aGk=".into()),
        };
        assert!(matches!(
            file_block(&pdf, true),
            ContentBlock::File { data: Some(ref d), .. } if d == "aGk="
        ));
    }

    #[test]
    fn test_attachment_only_context_has_no_empty_text_block() {
        let context = AttachedContext {
            prompt_nodes: 1,
            text: String::new(),
            blocks: vec![ContentBlock::File {
                file_id: "f".into(),
                name: "a.txt".into(),
                mime_type: "text/plain".into(),
                data: None,
            }],
        };
        let message = context.into_message();
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.role, Role::User);
    }
}
