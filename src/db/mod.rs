mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;

/// Shared handle to the SQLite database. Clones share one connection.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.lock()?;
        schema::run_migrations(&mut conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    /// Runs `f` against the connection outside of an explicit transaction.
    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Unit of work: runs `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`. The write lock is
    /// taken up front, so concurrent units of work on the same rows are
    /// serialized and each observes the other's committed result.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error> + From<rusqlite::Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ============================================================
    // User operations
    // ============================================================

    pub fn create_user(&self, input: CreateUserInput) -> Result<User> {
        let conn = self.lock()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (id, name, email, role, created_at) VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.email,
                input.role.as_str(),
                timestamp(now),
            ),
        )?;

        Ok(User {
            id,
            name: input.name,
            email: input.email,
            role: input.role,
            created_at: now,
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, email, role, created_at FROM users WHERE id = ?",
                    [id.to_string()],
                    user_from_row,
                )
                .optional()?)
        })
    }

    /// Issues a new session token for the user.
    pub fn create_session(&self, user_id: Uuid) -> Result<UserSession> {
        self.get_user(user_id)?
            .ok_or_else(|| anyhow::anyhow!("User not found"))?;

        let conn = self.lock()?;
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let now = Utc::now();

        conn.execute(
            "INSERT INTO user_sessions (token, user_id, created_at) VALUES (?, ?, ?)",
            (&token, user_id.to_string(), timestamp(now)),
        )?;

        Ok(UserSession {
            token,
            user_id,
            created_at: now,
        })
    }

    pub fn get_user_by_session(&self, token: &str) -> Result<Option<User>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT u.id, u.name, u.email, u.role, u.created_at
                     FROM user_sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.token = ?",
                    [token],
                    user_from_row,
                )
                .optional()?)
        })
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id"
            ))?;
            let projects = stmt
                .query_map([], project_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(projects)
        })
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        self.read(|conn| Ok(fetch_project(conn, id)?))
    }

    pub fn create_project(&self, teacher_id: Uuid, input: CreateProjectInput) -> Result<Project> {
        let conn = self.lock()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, title, description, teacher_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.title,
                &input.description,
                teacher_id.to_string(),
                ProjectStatus::Open.as_str(),
                timestamp(now),
                timestamp(now),
            ),
        )?;

        Ok(Project {
            id,
            title: input.title,
            description: input.description,
            teacher_id,
            status: ProjectStatus::Open,
            created_at: now,
            updated_at: now,
        })
    }

    /// Writes a project status without checking the transition.
    pub fn set_project_status(&self, id: Uuid, status: ProjectStatus) -> Result<Option<Project>> {
        self.transaction(|conn| {
            update_project_status(conn, id, status, Utc::now())?;
            Ok(fetch_project(conn, id)?)
        })
    }

    pub fn get_project_students(&self, project_id: Uuid) -> Result<Vec<Uuid>> {
        self.read(|conn| Ok(fetch_project_students(conn, project_id)?))
    }

    pub fn get_project_with_students(&self, id: Uuid) -> Result<Option<ProjectWithStudents>> {
        self.read(|conn| {
            let Some(project) = fetch_project(conn, id)? else {
                return Ok(None);
            };
            let students = fetch_project_students(conn, id)?;
            Ok(Some(ProjectWithStudents { project, students }))
        })
    }

    pub fn is_enrolled(&self, project_id: Uuid, student_id: Uuid) -> Result<bool> {
        self.read(|conn| Ok(is_enrolled(conn, project_id, student_id)?))
    }

    // ============================================================
    // Application operations (reads; writes live in `applications`)
    // ============================================================

    pub fn get_application(&self, id: Uuid) -> Result<Option<ProjectApplication>> {
        self.read(|conn| Ok(fetch_application(conn, id)?))
    }

    pub fn get_applications_by_project(&self, project_id: Uuid) -> Result<Vec<ProjectApplication>> {
        self.query_applications("project_id", project_id)
    }

    pub fn get_applications_by_student(&self, student_id: Uuid) -> Result<Vec<ProjectApplication>> {
        self.query_applications("student_id", student_id)
    }

    fn query_applications(&self, column: &str, id: Uuid) -> Result<Vec<ProjectApplication>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APPLICATION_COLUMNS} FROM project_applications
                 WHERE {column} = ? ORDER BY created_at, id"
            ))?;
            let applications = stmt
                .query_map([id.to_string()], application_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(applications)
        })
    }

    // ============================================================
    // Task operations
    // ============================================================

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.read(|conn| Ok(fetch_task(conn, id)?))
    }

    pub fn get_tasks_by_project(&self, project_id: Uuid) -> Result<Vec<Task>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, title, description, status, created_at, updated_at
                 FROM tasks WHERE project_id = ? ORDER BY created_at, id",
            )?;
            let mut tasks = stmt
                .query_map([project_id.to_string()], task_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            for task in &mut tasks {
                task.assignees = fetch_task_assignees(conn, task.id)?;
            }
            Ok(tasks)
        })
    }

    /// Creates or updates a task of `project_id`.
    ///
    /// Every assignee must be enrolled in the project. The task row and its
    /// assignee set are written in one transaction.
    pub fn write_task(&self, project_id: Uuid, write: TaskWrite) -> AppResult<Task> {
        write.validate().map_err(AppError::Validation)?;

        self.transaction(|conn| {
            fetch_project(conn, project_id)?.ok_or(AppError::NotFound("Project"))?;
            let now = Utc::now();

            let task_id = match write {
                TaskWrite::Create(input) => {
                    ensure_enrolled(conn, project_id, &input.assignees)?;
                    let id = Uuid::new_v4();
                    conn.execute(
                        "INSERT INTO tasks (id, project_id, title, description, status, created_at, updated_at)
                         VALUES (?, ?, ?, ?, ?, ?, ?)",
                        (
                            id.to_string(),
                            project_id.to_string(),
                            input.title.trim(),
                            &input.description,
                            input.status.as_str(),
                            timestamp(now),
                            timestamp(now),
                        ),
                    )?;
                    replace_task_assignees(conn, id, &input.assignees)?;
                    id
                }
                TaskWrite::Update(input) => {
                    let existing = fetch_task(conn, input.id)?
                        .filter(|t| t.project_id == project_id)
                        .ok_or(AppError::NotFound("Task"))?;
                    let title = input
                        .title
                        .map(|t| t.trim().to_string())
                        .unwrap_or(existing.title);
                    let description = input.description.or(existing.description);
                    let status = input.status.unwrap_or(existing.status);

                    conn.execute(
                        "UPDATE tasks SET title = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
                        (
                            &title,
                            &description,
                            status.as_str(),
                            timestamp(now),
                            existing.id.to_string(),
                        ),
                    )?;
                    if let Some(assignees) = input.assignees {
                        ensure_enrolled(conn, project_id, &assignees)?;
                        replace_task_assignees(conn, existing.id, &assignees)?;
                    }
                    existing.id
                }
            };

            fetch_task(conn, task_id)?
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("task vanished after write")))
        })
    }

    // ============================================================
    // Mentorship booking operations (reads; writes live in `mentorship`)
    // ============================================================

    pub fn get_booking(&self, id: Uuid) -> Result<Option<MentorshipBooking>> {
        self.read(|conn| Ok(fetch_booking(conn, id)?))
    }

    /// Bookings the student takes part in, newest first.
    pub fn get_bookings_for_student(&self, student_id: Uuid) -> Result<Vec<MentorshipBooking>> {
        self.query_bookings(
            "JOIN booking_students bs ON bs.booking_id = b.id WHERE bs.student_id = ?1",
            student_id,
        )
    }

    /// Bookings a staff member created or that belong to one of their projects.
    pub fn get_bookings_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<MentorshipBooking>> {
        self.query_bookings(
            "JOIN projects p ON p.id = b.project_id WHERE b.teacher_id = ?1 OR p.teacher_id = ?1",
            teacher_id,
        )
    }

    pub fn get_all_bookings(&self) -> Result<Vec<MentorshipBooking>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKING_COLUMNS} FROM mentorship_bookings b ORDER BY b.created_at DESC, b.id"
            ))?;
            let bookings = stmt
                .query_map([], booking_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            with_booking_students(conn, bookings)
        })
    }

    fn query_bookings(&self, filter: &str, id: Uuid) -> Result<Vec<MentorshipBooking>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT {BOOKING_COLUMNS} FROM mentorship_bookings b {filter}
                 ORDER BY b.created_at DESC, b.id"
            ))?;
            let bookings = stmt
                .query_map([id.to_string()], booking_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            with_booking_students(conn, bookings)
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Platform data directory location of the database file.
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "projecthub")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("projecthub.db"))
}

// ============================================================
// Row-level helpers, usable inside a unit of work
// ============================================================

const PROJECT_COLUMNS: &str = "id, title, description, teacher_id, status, created_at, updated_at";

const APPLICATION_COLUMNS: &str =
    "id, project_id, student_id, motivation, status, created_at, updated_at";

const BOOKING_COLUMNS: &str =
    "b.id, b.project_id, b.teacher_id, b.minutes, b.agreements, b.scheduled_at, b.created_at";

pub(crate) fn fetch_project(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
        [id.to_string()],
        project_from_row,
    )
    .optional()
}

pub(crate) fn update_project_status(
    conn: &Connection,
    id: Uuid,
    status: ProjectStatus,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE projects SET status = ?, updated_at = ? WHERE id = ?",
        (status.as_str(), timestamp(now), id.to_string()),
    )
}

pub(crate) fn fetch_project_students(
    conn: &Connection,
    project_id: Uuid,
) -> rusqlite::Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM project_students WHERE project_id = ? ORDER BY enrolled_at, student_id",
    )?;
    let students = stmt
        .query_map([project_id.to_string()], |row| {
            Ok(parse_uuid(row.get::<_, String>(0)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

pub(crate) fn is_enrolled(
    conn: &Connection,
    project_id: Uuid,
    student_id: Uuid,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM project_students WHERE project_id = ? AND student_id = ?)",
        (project_id.to_string(), student_id.to_string()),
        |row| row.get(0),
    )
}

/// Adds the student to the project's enrolled set. Re-enrolling is a no-op.
pub(crate) fn enroll_student(
    conn: &Connection,
    project_id: Uuid,
    student_id: Uuid,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO project_students (project_id, student_id, enrolled_at) VALUES (?, ?, ?)",
        (project_id.to_string(), student_id.to_string(), timestamp(now)),
    )?;
    Ok(())
}

pub(crate) fn fetch_application(
    conn: &Connection,
    id: Uuid,
) -> rusqlite::Result<Option<ProjectApplication>> {
    conn.query_row(
        &format!("SELECT {APPLICATION_COLUMNS} FROM project_applications WHERE id = ?"),
        [id.to_string()],
        application_from_row,
    )
    .optional()
}

pub(crate) fn fetch_application_for(
    conn: &Connection,
    project_id: Uuid,
    student_id: Uuid,
) -> rusqlite::Result<Option<ProjectApplication>> {
    conn.query_row(
        &format!(
            "SELECT {APPLICATION_COLUMNS} FROM project_applications
             WHERE project_id = ? AND student_id = ?"
        ),
        (project_id.to_string(), student_id.to_string()),
        application_from_row,
    )
    .optional()
}

fn fetch_task(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT id, project_id, title, description, status, created_at, updated_at
             FROM tasks WHERE id = ?",
            [id.to_string()],
            task_from_row,
        )
        .optional()?;

    match task {
        Some(mut task) => {
            task.assignees = fetch_task_assignees(conn, task.id)?;
            Ok(Some(task))
        }
        None => Ok(None),
    }
}

fn fetch_task_assignees(conn: &Connection, task_id: Uuid) -> rusqlite::Result<Vec<Uuid>> {
    let mut stmt =
        conn.prepare("SELECT student_id FROM task_assignees WHERE task_id = ? ORDER BY student_id")?;
    let assignees = stmt
        .query_map([task_id.to_string()], |row| {
            Ok(parse_uuid(row.get::<_, String>(0)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assignees)
}

fn replace_task_assignees(
    conn: &Connection,
    task_id: Uuid,
    assignees: &[Uuid],
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM task_assignees WHERE task_id = ?",
        [task_id.to_string()],
    )?;
    for student_id in assignees {
        conn.execute(
            "INSERT OR IGNORE INTO task_assignees (task_id, student_id) VALUES (?, ?)",
            (task_id.to_string(), student_id.to_string()),
        )?;
    }
    Ok(())
}

fn ensure_enrolled(conn: &Connection, project_id: Uuid, students: &[Uuid]) -> AppResult<()> {
    for student_id in students {
        if !is_enrolled(conn, project_id, *student_id)? {
            return Err(AppError::validation(format!(
                "Student {student_id} is not enrolled in this project"
            )));
        }
    }
    Ok(())
}

pub(crate) fn fetch_booking(
    conn: &Connection,
    id: Uuid,
) -> rusqlite::Result<Option<MentorshipBooking>> {
    let booking = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM mentorship_bookings b WHERE b.id = ?"),
            [id.to_string()],
            booking_from_row,
        )
        .optional()?;

    match booking {
        Some(mut booking) => {
            booking.students = fetch_booking_students(conn, booking.id)?;
            Ok(Some(booking))
        }
        None => Ok(None),
    }
}

fn fetch_booking_students(conn: &Connection, booking_id: Uuid) -> rusqlite::Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM booking_students WHERE booking_id = ? ORDER BY student_id",
    )?;
    let students = stmt
        .query_map([booking_id.to_string()], |row| {
            Ok(parse_uuid(row.get::<_, String>(0)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

fn with_booking_students(
    conn: &Connection,
    mut bookings: Vec<MentorshipBooking>,
) -> Result<Vec<MentorshipBooking>> {
    for booking in &mut bookings {
        booking.students = fetch_booking_students(conn, booking.id)?;
    }
    Ok(bookings)
}

pub(crate) fn insert_booking(
    conn: &Connection,
    project_id: Uuid,
    teacher_id: Option<Uuid>,
    students: &[Uuid],
    input: &CreateBookingInput,
    minutes: u32,
    now: DateTime<Utc>,
) -> rusqlite::Result<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO mentorship_bookings (id, project_id, teacher_id, minutes, agreements, scheduled_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            project_id.to_string(),
            teacher_id.map(|u| u.to_string()),
            minutes,
            &input.agreements,
            input.scheduled_at.map(timestamp),
            timestamp(now),
        ),
    )?;
    for student_id in students {
        conn.execute(
            "INSERT OR IGNORE INTO booking_students (booking_id, student_id) VALUES (?, ?)",
            (id.to_string(), student_id.to_string()),
        )?;
    }
    Ok(id)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        role: Role::from_str(&row.get::<_, String>(3)?).unwrap_or(Role::Student),
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        teacher_id: parse_uuid(row.get::<_, String>(3)?),
        status: ProjectStatus::from_str(&row.get::<_, String>(4)?)
            .unwrap_or(ProjectStatus::Open),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectApplication> {
    Ok(ProjectApplication {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        student_id: parse_uuid(row.get::<_, String>(2)?),
        motivation: row.get(3)?,
        status: ApplicationStatus::from_str(&row.get::<_, String>(4)?)
            .unwrap_or(ApplicationStatus::Pending),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// Maps a task row; assignees are loaded separately.
fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status: TaskStatus::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        assignees: Vec::new(),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// Maps a booking row; students are loaded separately.
fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<MentorshipBooking> {
    Ok(MentorshipBooking {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        teacher_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        students: Vec::new(),
        minutes: row.get(3)?,
        agreements: row.get(4)?,
        scheduled_at: row.get::<_, Option<String>>(5)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// Fixed-precision RFC 3339, so text order equals time order.
pub(crate) fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
