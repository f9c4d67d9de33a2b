use crate::config::DatabaseConfig;
use crate::models::{AuditEntry, NewPatient, Patient};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};

const CREATE_PATIENTS: &str = "CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    diabetes BOOLEAN NOT NULL,
    smoking BOOLEAN NOT NULL,
    tumor BOOLEAN NOT NULL,
    volume REAL NOT NULL,
    procedure TEXT NOT NULL,
    date TEXT NOT NULL
)";

const CREATE_AUDIT_LOG: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    timestamp TEXT NOT NULL
)";

/// Handle to the SQLite store.
///
/// Holds connection options only. Every operation opens its own connection
/// and closes it before returning; on an error path the connection is
/// released when it is dropped.
#[derive(Debug, Clone)]
pub struct Database {
    options: SqliteConnectOptions,
}

impl Database {
    /// Open the store described by `config`, creating the file and the schema
    /// if they do not exist yet.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);

        let db = Self { options };
        db.init_schema().await?;
        Ok(db)
    }

    async fn connect(&self) -> Result<SqliteConnection, sqlx::Error> {
        self.options.connect().await
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.connect().await?;
        sqlx::query(CREATE_PATIENTS).execute(&mut conn).await?;
        sqlx::query(CREATE_AUDIT_LOG).execute(&mut conn).await?;
        conn.close().await
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.connect().await?;
        sqlx::query("SELECT 1").fetch_one(&mut conn).await?;
        conn.close().await
    }

    // ============ Patients ============

    pub async fn insert_patient(&self, patient: &NewPatient) -> Result<i64, sqlx::Error> {
        let mut conn = self.connect().await?;
        let id = sqlx::query(
            "INSERT INTO patients (name, age, diabetes, smoking, tumor, volume, procedure, date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&patient.name)
        .bind(patient.age)
        .bind(patient.diabetes)
        .bind(patient.smoking)
        .bind(patient.tumor)
        .bind(patient.volume)
        .bind(&patient.procedure)
        .bind(&patient.date)
        .execute(&mut conn)
        .await?
        .last_insert_rowid();

        conn.close().await?;
        Ok(id)
    }

    /// All patients, newest `date` first. Rows sharing a date come out newest
    /// insert first.
    pub async fn list_patients(&self) -> Result<Vec<Patient>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let patients = sqlx::query_as::<_, Patient>(
            "SELECT id, name, age, diabetes, smoking, tumor, volume, procedure, date
             FROM patients
             ORDER BY date DESC, id DESC",
        )
        .fetch_all(&mut conn)
        .await?;

        conn.close().await?;
        Ok(patients)
    }

    // ============ Audit Log ============

    /// Append one audit row. Returns once the row is committed.
    pub async fn insert_audit_entry(
        &self,
        username: &str,
        endpoint: &str,
        timestamp: &str,
    ) -> Result<i64, sqlx::Error> {
        let mut conn = self.connect().await?;
        let id = sqlx::query("INSERT INTO audit_log (username, endpoint, timestamp) VALUES (?, ?, ?)")
            .bind(username)
            .bind(endpoint)
            .bind(timestamp)
            .execute(&mut conn)
            .await?
            .last_insert_rowid();

        conn.close().await?;
        Ok(id)
    }

    pub async fn list_audit_entries(&self) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, username, endpoint, timestamp
             FROM audit_log
             ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(&mut conn)
        .await?;

        conn.close().await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("test.db").display().to_string(),
        };
        let db = Database::open(&config).await.expect("Failed to open test database");
        (dir, db)
    }

    fn patient(name: &str, date: &str) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            age: 45,
            diabetes: true,
            smoking: false,
            tumor: false,
            volume: 12.5,
            procedure: "biopsy".to_string(),
            date: date.to_string(),
        }
    }

    #[actix_rt::test]
    async fn test_database_connection() {
        let (_dir, db) = temp_db().await;
        assert!(db.ping().await.is_ok());
    }

    #[actix_rt::test]
    async fn test_schema_creation_is_idempotent() {
        let (_dir, db) = temp_db().await;
        db.insert_patient(&patient("Ana", "2024-01-10")).await.unwrap();

        db.init_schema().await.unwrap();

        assert_eq!(db.list_patients().await.unwrap().len(), 1);
    }

    #[actix_rt::test]
    async fn test_empty_tables_list_nothing() {
        let (_dir, db) = temp_db().await;
        assert!(db.list_patients().await.unwrap().is_empty());
        assert!(db.list_audit_entries().await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_patients_ordered_by_date_descending() {
        let (_dir, db) = temp_db().await;
        db.insert_patient(&patient("Old", "2023-05-01")).await.unwrap();
        let newest = db.insert_patient(&patient("New", "2024-03-02")).await.unwrap();
        db.insert_patient(&patient("Mid", "2024-01-10")).await.unwrap();

        let patients = db.list_patients().await.unwrap();
        let names: Vec<&str> = patients.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["New", "Mid", "Old"]);
        assert_eq!(patients[0].id, newest);
    }

    #[actix_rt::test]
    async fn test_patient_fields_stored_verbatim() {
        let (_dir, db) = temp_db().await;
        let input = NewPatient {
            name: "Luis".to_string(),
            age: 61,
            diabetes: false,
            smoking: true,
            tumor: true,
            volume: 3.75,
            procedure: "resection".to_string(),
            date: "2024-02-29".to_string(),
        };
        let id = db.insert_patient(&input).await.unwrap();

        let stored = db.list_patients().await.unwrap().remove(0);

        assert_eq!(
            stored,
            Patient {
                id,
                name: input.name,
                age: input.age,
                diabetes: input.diabetes,
                smoking: input.smoking,
                tumor: input.tumor,
                volume: input.volume,
                procedure: input.procedure,
                date: input.date,
            }
        );
    }

    #[actix_rt::test]
    async fn test_audit_entries_ordered_by_timestamp_descending() {
        let (_dir, db) = temp_db().await;
        db.insert_audit_entry("admin", "/save", "2024-01-10T10:00:00.000000Z").await.unwrap();
        db.insert_audit_entry("medico", "/records", "2024-01-10T11:00:00.000000Z").await.unwrap();

        let entries = db.list_audit_entries().await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].username, "medico");
        assert_eq!(entries[0].endpoint, "/records");
        assert_eq!(entries[1].username, "admin");
        assert!(entries[0].id > entries[1].id);
    }
}
