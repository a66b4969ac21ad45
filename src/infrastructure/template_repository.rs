use crate::domain::models::Template;
use crate::infrastructure::config::read_templates;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn read_templates(&self) -> Result<Vec<Template>, InfraError>;

    async fn read_template(&self, template_id: &str) -> Result<Option<Template>, InfraError> {
        Ok(self
            .read_templates()
            .await?
            .into_iter()
            .find(|template| template.id == template_id))
    }
}

/// Reads `templates.json` from the config directory on every call so edits
/// made between runs are picked up by the next start or reset.
#[derive(Debug, Clone)]
pub struct JsonTemplateRepository {
    config_dir: PathBuf,
}

impl JsonTemplateRepository {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TemplateRepository for JsonTemplateRepository {
    async fn read_templates(&self) -> Result<Vec<Template>, InfraError> {
        read_templates(&self.config_dir)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateRepository {
    templates: Mutex<Vec<Template>>,
}

impl InMemoryTemplateRepository {
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            templates: Mutex::new(templates),
        }
    }

    pub fn replace(&self, template: Template) -> Result<(), InfraError> {
        let mut templates = self
            .templates
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("template store: {error}")))?;
        match templates.iter_mut().find(|stored| stored.id == template.id) {
            Some(stored) => *stored = template,
            None => templates.push(template),
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn read_templates(&self) -> Result<Vec<Template>, InfraError> {
        let templates = self
            .templates
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("template store: {error}")))?;
        Ok(templates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskOffset, TemplateTask};
    use crate::infrastructure::config::ensure_default_configs;
    use std::fs;

    fn bedtime() -> Template {
        Template {
            id: "bedtime".to_string(),
            name: "Bedtime".to_string(),
            default_end_time: "21:00".to_string(),
            tasks: vec![TemplateTask {
                id: "pajamas".to_string(),
                title: "Pajamas".to_string(),
                helper_text: None,
                offset: TaskOffset::Minutes(20),
            }],
        }
    }

    #[tokio::test]
    async fn json_repository_reads_seeded_template() {
        let config_dir = std::env::temp_dir().join(format!(
            "routine-runner-template-tests-{}",
            std::process::id()
        ));
        fs::create_dir_all(&config_dir).expect("create config dir");
        ensure_default_configs(&config_dir).expect("write defaults");

        let repository = JsonTemplateRepository::new(&config_dir);
        let template = repository
            .read_template("evening-routine")
            .await
            .expect("read template")
            .expect("seeded template");
        assert_eq!(template.tasks.len(), 4);
        assert_eq!(repository.read_template("missing").await.expect("read"), None);

        let _ = fs::remove_dir_all(&config_dir);
    }

    #[tokio::test]
    async fn in_memory_repository_replaces_by_id() {
        let repository = InMemoryTemplateRepository::new(vec![bedtime()]);
        let mut edited = bedtime();
        edited.tasks[0].offset = TaskOffset::Flexible;
        repository.replace(edited.clone()).expect("replace");

        assert_eq!(repository.read_templates().await.expect("read"), vec![edited]);
    }
}
