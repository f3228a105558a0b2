use std::collections::BTreeMap;
use std::path::PathBuf;

use log::info;
use rusqlite::{params, OptionalExtension};

use crate::db::{parse_timestamp, AnalysisRepository, Database};
use crate::error::DatabaseError;
use crate::model::analysis::{Analysis, AnalysisOutputFile};
use crate::model::submission::SubmissionId;

impl AnalysisRepository for Database {
    fn insert_analysis(&self, submission: SubmissionId, analysis: &Analysis) -> Result<i64, DatabaseError> {
        let id = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO analysis (submission_id, execution_manager_analysis_id, description, created)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    submission,
                    analysis.execution_manager_analysis_id(),
                    analysis.description(),
                    analysis.created_date().to_rfc3339()
                ],
            )?;
            let id = tx.last_insert_rowid();
            for (key, file) in analysis.output_files() {
                tx.execute(
                    "INSERT INTO analysis_output_file (analysis_id, output_key, path, label, execution_manager_file_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, key, file.path().to_string_lossy(), file.label(), file.execution_manager_file_id()],
                )?;
            }
            for (key, value) in analysis.additional_properties() {
                tx.execute(
                    "INSERT INTO analysis_property (analysis_id, property_key, property_value) VALUES (?1, ?2, ?3)",
                    params![id, key, value],
                )?;
            }
            tx.commit()?;
            Ok(id)
        })?;
        info!("Stored analysis {id} for submission {submission} with {} output files", analysis.output_files().len());
        Ok(id)
    }

    fn analysis_for_submission(&self, submission: SubmissionId) -> Result<Option<Analysis>, DatabaseError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, execution_manager_analysis_id, description, created FROM analysis WHERE submission_id = ?1",
                    params![submission],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            let Some((id, execution_manager_analysis_id, description, created)) = row else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT output_key, path, label, execution_manager_file_id FROM analysis_output_file WHERE analysis_id = ?1",
            )?;
            let output_files = stmt
                .query_map(params![id], |row| {
                    let path: String = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, AnalysisOutputFile::new(PathBuf::from(path), row.get(2)?, row.get(3)?)))
                })?
                .collect::<Result<BTreeMap<_, _>, _>>()?;

            let mut stmt =
                conn.prepare("SELECT property_key, property_value FROM analysis_property WHERE analysis_id = ?1")?;
            let properties = stmt
                .query_map(params![id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<BTreeMap<_, _>, _>>()?;

            Ok(Some(Analysis::restore(
                parse_timestamp(&created)?,
                execution_manager_analysis_id,
                output_files,
                description,
                properties,
            )))
        })
    }
}
