use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::db::{now, parse_timestamp, Database, SubmissionRepository, SubmissionUpdate};
use crate::error::DatabaseError;
use crate::galaxy::{RemoteRunHandle, UploadedInput, WorkspaceHandle};
use crate::model::sequencing::{ProjectId, SequencingObjectId};
use crate::model::state::WorkflowState;
use crate::model::submission::{AnalysisSubmission, NewSubmission, RemoteHandles, SubmissionId, SubmissionInput};
use crate::model::template::TemplateId;

const COLUMNS: &str = "s.id, s.name, s.workflow_id, s.submitter, s.update_samples, s.state, s.remote_workspace, \
                       s.remote_datasets, s.remote_run, s.status_message, s.created";

/// A raw submission row, before its JSON and enum columns are decoded
struct SubmissionRow {
    id: SubmissionId,
    name: String,
    workflow_id: String,
    submitter: String,
    update_samples: bool,
    state: String,
    remote_workspace: Option<String>,
    remote_datasets: Option<String>,
    remote_run: Option<String>,
    status_message: Option<String>,
    created: String,
}

impl SubmissionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SubmissionRow {
            id: row.get(0)?,
            name: row.get(1)?,
            workflow_id: row.get(2)?,
            submitter: row.get(3)?,
            update_samples: row.get(4)?,
            state: row.get(5)?,
            remote_workspace: row.get(6)?,
            remote_datasets: row.get(7)?,
            remote_run: row.get(8)?,
            status_message: row.get(9)?,
            created: row.get(10)?,
        })
    }

    fn into_submission(self, inputs: Vec<SubmissionInput>) -> Result<AnalysisSubmission, DatabaseError> {
        let datasets = match self.remote_datasets {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        Ok(AnalysisSubmission {
            id: self.id,
            name: self.name,
            workflow_id: Uuid::parse_str(&self.workflow_id)?,
            submitter: self.submitter,
            update_samples: self.update_samples,
            inputs,
            state: self.state.parse()?,
            remote: RemoteHandles {
                workspace: self.remote_workspace.map(WorkspaceHandle),
                datasets,
                run: self.remote_run.map(RemoteRunHandle),
            },
            status_message: self.status_message,
            created_date: parse_timestamp(&self.created)?,
        })
    }
}

fn load_inputs(conn: &Connection, id: SubmissionId) -> Result<Vec<SubmissionInput>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT sequencing_object_id, files FROM submission_input WHERE submission_id = ?1 ORDER BY sequencing_object_id",
    )?;
    let rows = stmt
        .query_map(params![id], |row| Ok((row.get::<_, SequencingObjectId>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(sequencing_object_id, files)| {
            Ok(SubmissionInput { sequencing_object_id, files: serde_json::from_str(&files)? })
        })
        .collect()
}

/// Run a submission query and attach the inputs of every row
fn load_submissions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<AnalysisSubmission>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, SubmissionRow::from_row)?.collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| {
            let inputs = load_inputs(conn, row.id)?;
            row.into_submission(inputs)
        })
        .collect()
}

/// Whether a template already has a live submission reading this sequencing object
fn template_launched_for(
    conn: &Connection,
    template: TemplateId,
    object: SequencingObjectId,
) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM analysis_submission s
         JOIN submission_input i ON i.submission_id = s.id
         WHERE s.template_id = ?1 AND i.sequencing_object_id = ?2 AND s.state != 'ERROR'",
        params![template, object],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl SubmissionRepository for Database {
    fn insert_submission(&self, submission: &NewSubmission) -> Result<AnalysisSubmission, DatabaseError> {
        let id = self.with_conn(|conn| {
            // take the write lock up front so two processes can't both pass the launch check
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            if let Some(template) = submission.template_id() {
                for input in submission.inputs() {
                    if template_launched_for(&tx, template, input.sequencing_object_id)? {
                        return Err(DatabaseError::AlreadyLaunched {
                            template,
                            sequencing_object: input.sequencing_object_id,
                        });
                    }
                }
            }

            let timestamp = now();
            tx.execute(
                "INSERT INTO analysis_submission (name, workflow_id, submitter, update_samples, template_id, created, modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    submission.name(),
                    submission.workflow_id().to_string(),
                    submission.submitter(),
                    submission.update_samples(),
                    submission.template_id(),
                    timestamp
                ],
            )?;
            let id = tx.last_insert_rowid();
            for input in submission.inputs() {
                tx.execute(
                    "INSERT INTO submission_input (submission_id, sequencing_object_id, files) VALUES (?1, ?2, ?3)",
                    params![id, input.sequencing_object_id, serde_json::to_string(&input.files)?],
                )?;
            }
            if let Some(project) = submission.project_id() {
                tx.execute(
                    "INSERT OR IGNORE INTO project_analysis_submission (project_id, submission_id, created) VALUES (?1, ?2, ?3)",
                    params![project, id, timestamp],
                )?;
            }
            tx.commit()?;
            Ok(id)
        })?;
        match submission.project_id() {
            Some(project) => info!(
                "Stored submission {id} '{}' for workflow {}, shared with project {project}",
                submission.name(),
                submission.workflow_id()
            ),
            None => info!("Stored submission {id} '{}' for workflow {}", submission.name(), submission.workflow_id()),
        }

        self.find_submission(id)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn find_submission(&self, id: SubmissionId) -> Result<Option<AnalysisSubmission>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM analysis_submission s WHERE s.id = ?1");
            let row = conn.query_row(&sql, params![id], SubmissionRow::from_row).optional()?;
            match row {
                Some(row) => {
                    let inputs = load_inputs(conn, row.id)?;
                    Ok(Some(row.into_submission(inputs)?))
                }
                None => Ok(None),
            }
        })
    }

    fn submissions_with_states(&self, states: &[WorkflowState]) -> Result<Vec<AnalysisSubmission>, DatabaseError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!("SELECT {COLUMNS} FROM analysis_submission s WHERE s.state IN ({placeholders}) ORDER BY s.id");
        self.with_conn(|conn| load_submissions(conn, &sql, params_from_iter(states.iter().map(|s| s.as_str()))))
    }

    fn update_state_if(
        &self,
        id: SubmissionId,
        expected: WorkflowState,
        next: WorkflowState,
        update: &SubmissionUpdate,
    ) -> Result<bool, DatabaseError> {
        let datasets = update.datasets.as_ref().map(serde_json::to_string).transpose()?;
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE analysis_submission SET
                    state = ?3,
                    remote_workspace = COALESCE(?4, remote_workspace),
                    remote_datasets = COALESCE(?5, remote_datasets),
                    remote_run = COALESCE(?6, remote_run),
                    status_message = COALESCE(?7, status_message),
                    modified = ?8
                 WHERE id = ?1 AND state = ?2",
                params![
                    id,
                    expected.as_str(),
                    next.as_str(),
                    update.workspace.as_ref().map(|w| w.0.as_str()),
                    datasets,
                    update.run.as_ref().map(|r| r.0.as_str()),
                    update.status_message,
                    now()
                ],
            )?)
        })?;

        if changed > 0 && expected != next {
            info!("Submission {id}: {expected} -> {next}");
        }
        Ok(changed > 0)
    }

    fn reclaim_preparation(&self, id: SubmissionId, stale_before: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let seen: Option<String> = conn
                .query_row(
                    "SELECT modified FROM analysis_submission WHERE id = ?1 AND state = 'PREPARING' AND remote_datasets IS NULL",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(seen) = seen else {
                return Ok(false);
            };
            if parse_timestamp(&seen)? > stale_before {
                return Ok(false);
            }

            // the modified time doubles as a claim token: a worker that read the same value loses
            let changed = conn.execute(
                "UPDATE analysis_submission SET modified = ?3
                 WHERE id = ?1 AND state = 'PREPARING' AND remote_datasets IS NULL AND modified = ?2",
                params![id, seen, now()],
            )?;
            if changed > 0 {
                info!("Submission {id}: reclaimed preparation last touched at {seen}");
            }
            Ok(changed > 0)
        })
    }

    fn record_uploads(
        &self,
        id: SubmissionId,
        workspace: &WorkspaceHandle,
        datasets: &[UploadedInput],
    ) -> Result<bool, DatabaseError> {
        let datasets = serde_json::to_string(datasets)?;
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE analysis_submission SET remote_workspace = ?2, remote_datasets = ?3, modified = ?4
                 WHERE id = ?1 AND state = 'PREPARING' AND remote_datasets IS NULL",
                params![id, workspace.0, datasets, now()],
            )?)
        })?;
        Ok(changed > 0)
    }

    fn submissions_for_project(&self, project: ProjectId) -> Result<Vec<AnalysisSubmission>, DatabaseError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM analysis_submission s
             JOIN project_analysis_submission p ON p.submission_id = s.id
             WHERE p.project_id = ?1 ORDER BY s.id"
        );
        self.with_conn(|conn| load_submissions(conn, &sql, params![project]))
    }
}
