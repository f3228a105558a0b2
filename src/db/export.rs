use log::info;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{now, parse_timestamp, Database, ExportRepository};
use crate::error::DatabaseError;
use crate::model::export::{ExportId, NcbiExportSubmission, NewExport};
use crate::model::state::ExportUploadState;

const COLUMNS: &str = "id, bio_project, namespace, submitter, samples, upload_state, created";

struct ExportRow {
    id: ExportId,
    bio_project: String,
    namespace: String,
    submitter: String,
    samples: String,
    upload_state: String,
    created: String,
}

impl ExportRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ExportRow {
            id: row.get("id")?,
            bio_project: row.get("bio_project")?,
            namespace: row.get("namespace")?,
            submitter: row.get("submitter")?,
            samples: row.get("samples")?,
            upload_state: row.get("upload_state")?,
            created: row.get("created")?,
        })
    }

    fn into_export(self) -> Result<NcbiExportSubmission, DatabaseError> {
        Ok(NcbiExportSubmission {
            id: self.id,
            bio_project: self.bio_project,
            namespace: self.namespace,
            submitter: self.submitter,
            samples: serde_json::from_str(&self.samples)?,
            upload_state: self.upload_state.parse()?,
            created_date: parse_timestamp(&self.created)?,
        })
    }
}

impl ExportRepository for Database {
    fn insert_export(&self, export: &NewExport) -> Result<NcbiExportSubmission, DatabaseError> {
        let samples = serde_json::to_string(&export.samples)?;
        let id = self.with_conn(|conn| {
            let timestamp = now();
            conn.execute(
                "INSERT INTO ncbi_export (bio_project, namespace, submitter, samples, created, modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![export.bio_project, export.namespace, export.submitter, samples, timestamp],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        info!("Queued export {id} for BioProject {}", export.bio_project);

        self.find_export(id)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn find_export(&self, id: ExportId) -> Result<Option<NcbiExportSubmission>, DatabaseError> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM ncbi_export WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], ExportRow::from_row).optional()?)
        })?;
        row.map(ExportRow::into_export).transpose()
    }

    fn exports_with_state(&self, state: ExportUploadState) -> Result<Vec<NcbiExportSubmission>, DatabaseError> {
        let rows = self.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM ncbi_export WHERE upload_state = ?1 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![state.as_str()], ExportRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(ExportRow::into_export).collect()
    }

    fn update_export_state_if(
        &self,
        id: ExportId,
        expected: ExportUploadState,
        next: ExportUploadState,
    ) -> Result<bool, DatabaseError> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE ncbi_export SET upload_state = ?3, modified = ?4 WHERE id = ?1 AND upload_state = ?2",
                params![id, expected.as_str(), next.as_str(), now()],
            )?)
        })?;
        if changed > 0 {
            info!("Export {id}: {expected} -> {next}");
        }
        Ok(changed > 0)
    }
}
