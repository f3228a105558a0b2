use log::{debug, info};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{now, Database, SequencingRepository};
use crate::error::DatabaseError;
use crate::model::sequencing::{
    Project, ProjectId, ProjectSampleJoin, ResultSlot, Sample, SampleId, SequenceFiles, SequencingObject,
    SequencingObjectId,
};
use crate::model::submission::SubmissionId;

struct SequencingObjectRow {
    id: SequencingObjectId,
    sample_id: Option<SampleId>,
    files: String,
    automated_assembly: Option<SubmissionId>,
    sistr_typing: Option<SubmissionId>,
}

impl SequencingObjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SequencingObjectRow {
            id: row.get("id")?,
            sample_id: row.get("sample_id")?,
            files: row.get("files")?,
            automated_assembly: row.get("automated_assembly")?,
            sistr_typing: row.get("sistr_typing")?,
        })
    }

    fn into_object(self) -> Result<SequencingObject, DatabaseError> {
        Ok(SequencingObject {
            id: self.id,
            sample_id: self.sample_id,
            files: serde_json::from_str(&self.files)?,
            automated_assembly: self.automated_assembly,
            sistr_typing: self.sistr_typing,
        })
    }
}

impl SequencingRepository for Database {
    fn insert_project(&self, name: &str) -> Result<Project, DatabaseError> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO project (name) VALUES (?1)", params![name])?;
            Ok(Project { id: conn.last_insert_rowid(), name: name.to_string() })
        })
    }

    fn insert_sample(&self, name: &str) -> Result<Sample, DatabaseError> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO sample (name) VALUES (?1)", params![name])?;
            Ok(Sample { id: conn.last_insert_rowid(), name: name.to_string() })
        })
    }

    fn add_sample_to_project(&self, project: ProjectId, sample: SampleId, owner: bool) -> Result<(), DatabaseError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO project_sample (project_id, sample_id, owner) VALUES (?1, ?2, ?3)",
                params![project, sample, owner],
            )?;
            Ok(())
        })
    }

    fn projects_for_sample(&self, sample: SampleId) -> Result<Vec<ProjectSampleJoin>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name, s.id, s.name, ps.owner
                 FROM project_sample ps
                 JOIN project p ON p.id = ps.project_id
                 JOIN sample s ON s.id = ps.sample_id
                 WHERE ps.sample_id = ?1
                 ORDER BY p.id",
            )?;
            let joins = stmt
                .query_map(params![sample], |row| {
                    Ok(ProjectSampleJoin {
                        project: Project { id: row.get(0)?, name: row.get(1)? },
                        sample: Sample { id: row.get(2)?, name: row.get(3)? },
                        owner: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(joins)
        })
    }

    fn insert_sequencing_object(
        &self,
        sample: Option<SampleId>,
        files: &SequenceFiles,
    ) -> Result<SequencingObject, DatabaseError> {
        let json = serde_json::to_string(files)?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sequencing_object (sample_id, files, created) VALUES (?1, ?2, ?3)",
                params![sample, json, now()],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        info!("Stored sequencing object {id}");

        Ok(SequencingObject {
            id,
            sample_id: sample,
            files: files.clone(),
            automated_assembly: None,
            sistr_typing: None,
        })
    }

    fn find_sequencing_object(&self, id: SequencingObjectId) -> Result<Option<SequencingObject>, DatabaseError> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, sample_id, files, automated_assembly, sistr_typing FROM sequencing_object WHERE id = ?1",
                    params![id],
                    SequencingObjectRow::from_row,
                )
                .optional()?)
        })?;
        row.map(SequencingObjectRow::into_object).transpose()
    }

    fn sample_for_sequencing_object(&self, id: SequencingObjectId) -> Result<Option<Sample>, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT s.id, s.name FROM sequencing_object o JOIN sample s ON s.id = o.sample_id WHERE o.id = ?1",
                    params![id],
                    |row| Ok(Sample { id: row.get(0)?, name: row.get(1)? }),
                )
                .optional()?)
        })
    }

    fn detach_sequencing_object(&self, id: SequencingObjectId) -> Result<(), DatabaseError> {
        info!("Removing sequencing object {id} from its sample");
        self.with_conn(|conn| {
            conn.execute("UPDATE sequencing_object SET sample_id = NULL WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    fn attach_result(
        &self,
        id: SequencingObjectId,
        slot: ResultSlot,
        submission: SubmissionId,
    ) -> Result<bool, DatabaseError> {
        let col = slot.column();
        // column name comes from a fixed enum, never from input
        let stmt = format!("UPDATE sequencing_object SET {col} = ?2 WHERE id = ?1 AND ({col} IS NULL OR {col} != ?2)");
        let changed = self.with_conn(|conn| Ok(conn.execute(&stmt, params![id, submission])?))?;
        debug!("Attach submission {submission} as {col} of sequencing object {id}: {changed} row(s)");
        Ok(changed > 0)
    }
}
