use log::info;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{Database, TemplateRepository};
use crate::error::DatabaseError;
use crate::model::sequencing::ProjectId;
use crate::model::template::{AnalysisSubmissionTemplate, NewTemplate, TemplateId};

const COLUMNS: &str = "id, project_id, workflow_id, name, enabled, status_message, update_samples, submitter";

struct TemplateRow {
    id: TemplateId,
    project_id: ProjectId,
    workflow_id: String,
    name: String,
    enabled: bool,
    status_message: Option<String>,
    update_samples: bool,
    submitter: String,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TemplateRow {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            workflow_id: row.get("workflow_id")?,
            name: row.get("name")?,
            enabled: row.get("enabled")?,
            status_message: row.get("status_message")?,
            update_samples: row.get("update_samples")?,
            submitter: row.get("submitter")?,
        })
    }

    fn into_template(self) -> Result<AnalysisSubmissionTemplate, DatabaseError> {
        Ok(AnalysisSubmissionTemplate {
            id: self.id,
            project_id: self.project_id,
            workflow_id: Uuid::parse_str(&self.workflow_id)?,
            name: self.name,
            enabled: self.enabled,
            status_message: self.status_message,
            update_samples: self.update_samples,
            submitter: self.submitter,
        })
    }
}

impl TemplateRepository for Database {
    fn insert_template(&self, template: &NewTemplate) -> Result<AnalysisSubmissionTemplate, DatabaseError> {
        info!("Adding template '{}' to project {}", template.name, template.project_id);
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO analysis_template (project_id, workflow_id, name, update_samples, submitter)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    template.project_id,
                    template.workflow_id.to_string(),
                    template.name,
                    template.update_samples,
                    template.submitter
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(AnalysisSubmissionTemplate {
            id,
            project_id: template.project_id,
            workflow_id: template.workflow_id,
            name: template.name.clone(),
            enabled: true,
            status_message: None,
            update_samples: template.update_samples,
            submitter: template.submitter.clone(),
        })
    }

    fn find_template(&self, id: TemplateId) -> Result<Option<AnalysisSubmissionTemplate>, DatabaseError> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM analysis_template WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], TemplateRow::from_row).optional()?)
        })?;
        row.map(TemplateRow::into_template).transpose()
    }

    fn templates_for_project(&self, project: ProjectId) -> Result<Vec<AnalysisSubmissionTemplate>, DatabaseError> {
        let rows = self.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM analysis_template WHERE project_id = ?1 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![project], TemplateRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(TemplateRow::into_template).collect()
    }

    fn update_template_status(&self, id: TemplateId, enabled: bool, status_message: &str) -> Result<(), DatabaseError> {
        info!("Updating template {id}: enabled = {enabled}, status = '{status_message}'");
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE analysis_template SET enabled = ?2, status_message = ?3 WHERE id = ?1",
                params![id, enabled, status_message],
            )?;
            Ok(())
        })
    }
}
