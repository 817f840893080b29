use projecthub::db::Database;
use projecthub::error::AppError;
use projecthub::models::*;
use speculate2::speculate;
use uuid::Uuid;

fn create_user(db: &Database, name: &str, role: Role) -> User {
    db.create_user(CreateUserInput {
        name: name.to_string(),
        email: None,
        role,
    })
    .expect("Failed to create user")
}

fn create_project(db: &Database, teacher: &User, title: &str) -> Project {
    db.create_project(
        teacher.id,
        CreateProjectInput {
            title: title.to_string(),
            description: None,
        },
    )
    .expect("Failed to create project")
}

/// Enrolls `student` by writing the enrollment row directly.
fn enroll(db: &Database, project_id: Uuid, student_id: Uuid) {
    db.read(|conn| {
        conn.execute(
            "INSERT INTO project_students (project_id, student_id, enrolled_at)
             VALUES (?, ?, '2024-01-01T00:00:00.000000Z')",
            (project_id.to_string(), student_id.to_string()),
        )
        .map(|_| ())
        .map_err(anyhow::Error::from)
    })
    .expect("Failed to enroll");
}

fn create_task(title: &str, assignees: Vec<Uuid>) -> TaskWrite {
    TaskWrite::Create(CreateTaskInput {
        title: title.to_string(),
        description: None,
        status: TaskStatus::Todo,
        assignees,
    })
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let teacher = create_user(&db, "Ada", Role::Teacher);
    }

    describe "users" {
        it "round-trips a user through the database" {
            let created = db.create_user(CreateUserInput {
                name: "Sam".to_string(),
                email: Some("sam@school.test".to_string()),
                role: Role::Student,
            }).expect("Failed to create user");

            let found = db.get_user(created.id).expect("Query failed").expect("User missing");
            assert_eq!(found.name, "Sam");
            assert_eq!(found.email.as_deref(), Some("sam@school.test"));
            assert_eq!(found.role, Role::Student);
        }

        it "rejects a duplicate email" {
            let input = CreateUserInput {
                name: "Sam".to_string(),
                email: Some("sam@school.test".to_string()),
                role: Role::Student,
            };
            db.create_user(input.clone()).expect("Failed to create user");
            assert!(db.create_user(input).is_err());
        }

        it "returns None for an unknown user" {
            assert!(db.get_user(Uuid::new_v4()).expect("Query failed").is_none());
        }
    }

    describe "sessions" {
        it "resolves a session token to its user" {
            let session = db.create_session(teacher.id).expect("Failed to create session");
            assert_eq!(session.user_id, teacher.id);

            let user = db.get_user_by_session(&session.token).expect("Query failed");
            assert_eq!(user.map(|u| u.id), Some(teacher.id));
        }

        it "issues distinct tokens" {
            let a = db.create_session(teacher.id).expect("Failed to create session");
            let b = db.create_session(teacher.id).expect("Failed to create session");
            assert_ne!(a.token, b.token);
        }

        it "does not resolve unknown tokens" {
            assert!(db.get_user_by_session("nope").expect("Query failed").is_none());
        }

        it "refuses sessions for unknown users" {
            assert!(db.create_session(Uuid::new_v4()).is_err());
        }
    }

    describe "projects" {
        it "creates an open project owned by the teacher" {
            let project = create_project(&db, &teacher, "Robotics");
            assert_eq!(project.status, ProjectStatus::Open);
            assert_eq!(project.teacher_id, teacher.id);

            let stored = db.get_project(project.id).expect("Query failed").expect("Project missing");
            assert_eq!(stored.title, "Robotics");
        }

        it "lists projects oldest first" {
            create_project(&db, &teacher, "Zebra");
            create_project(&db, &teacher, "Alpha");

            let projects = db.get_all_projects().expect("Query failed");
            let titles: Vec<_> = projects.iter().map(|p| p.title.as_str()).collect();
            assert_eq!(titles, vec!["Zebra", "Alpha"]);
        }

        it "sets the status" {
            let project = create_project(&db, &teacher, "Robotics");
            let updated = db
                .set_project_status(project.id, ProjectStatus::Archived)
                .expect("Query failed")
                .expect("Project missing");
            assert_eq!(updated.status, ProjectStatus::Archived);
        }

        it "returns None when setting the status of an unknown project" {
            let result = db.set_project_status(Uuid::new_v4(), ProjectStatus::Archived).expect("Query failed");
            assert!(result.is_none());
        }

        it "returns the enrolled students with the project" {
            let project = create_project(&db, &teacher, "Robotics");
            let student = create_user(&db, "Sam", Role::Student);
            enroll(&db, project.id, student.id);

            let detail = db.get_project_with_students(project.id).expect("Query failed").expect("Project missing");
            assert_eq!(detail.students, vec![student.id]);
            assert!(db.is_enrolled(project.id, student.id).expect("Query failed"));
        }
    }

    describe "tasks" {
        it "creates a task with enrolled assignees" {
            let project = create_project(&db, &teacher, "Robotics");
            let student = create_user(&db, "Sam", Role::Student);
            enroll(&db, project.id, student.id);

            let task = db.write_task(project.id, create_task("  Wireframes ", vec![student.id]))
                .expect("Failed to create task");

            assert_eq!(task.title, "Wireframes");
            assert_eq!(task.status, TaskStatus::Todo);
            assert_eq!(task.assignees, vec![student.id]);
        }

        it "rejects assignees who are not enrolled" {
            let project = create_project(&db, &teacher, "Robotics");
            let outsider = create_user(&db, "Lee", Role::Student);

            let result = db.write_task(project.id, create_task("Wireframes", vec![outsider.id]));
            assert!(matches!(result, Err(AppError::Validation(_))));
            assert!(db.get_tasks_by_project(project.id).expect("Query failed").is_empty());
        }

        it "rejects an empty title before touching the database" {
            let result = db.write_task(Uuid::new_v4(), create_task("   ", vec![]));
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        it "fails with not found for an unknown project" {
            let result = db.write_task(Uuid::new_v4(), create_task("Wireframes", vec![]));
            assert!(matches!(result, Err(AppError::NotFound("Project"))));
        }

        it "updates only the given fields" {
            let project = create_project(&db, &teacher, "Robotics");
            let student = create_user(&db, "Sam", Role::Student);
            enroll(&db, project.id, student.id);
            let task = db.write_task(project.id, create_task("Wireframes", vec![student.id]))
                .expect("Failed to create task");

            let updated = db.write_task(project.id, TaskWrite::Update(UpdateTaskInput {
                id: task.id,
                title: None,
                description: Some("Low fidelity".to_string()),
                status: Some(TaskStatus::Review),
                assignees: None,
            })).expect("Failed to update task");

            assert_eq!(updated.title, "Wireframes");
            assert_eq!(updated.description.as_deref(), Some("Low fidelity"));
            assert_eq!(updated.status, TaskStatus::Review);
            assert_eq!(updated.assignees, vec![student.id]);
        }

        it "replaces the assignee set on update" {
            let project = create_project(&db, &teacher, "Robotics");
            let sam = create_user(&db, "Sam", Role::Student);
            let kim = create_user(&db, "Kim", Role::Student);
            enroll(&db, project.id, sam.id);
            enroll(&db, project.id, kim.id);
            let task = db.write_task(project.id, create_task("Wireframes", vec![sam.id]))
                .expect("Failed to create task");

            let updated = db.write_task(project.id, TaskWrite::Update(UpdateTaskInput {
                id: task.id,
                title: None,
                description: None,
                status: None,
                assignees: Some(vec![kim.id]),
            })).expect("Failed to update task");

            assert_eq!(updated.assignees, vec![kim.id]);
        }

        it "does not update a task through another project" {
            let project = create_project(&db, &teacher, "Robotics");
            let other = create_project(&db, &teacher, "Chemistry");
            let task = db.write_task(project.id, create_task("Wireframes", vec![]))
                .expect("Failed to create task");

            let result = db.write_task(other.id, TaskWrite::Update(UpdateTaskInput {
                id: task.id,
                title: Some("Hijacked".to_string()),
                description: None,
                status: None,
                assignees: None,
            }));
            assert!(matches!(result, Err(AppError::NotFound("Task"))));
            assert_eq!(db.get_task(task.id).expect("Query failed").unwrap().title, "Wireframes");
        }

        it "rolls back the task when the assignee update is invalid" {
            let project = create_project(&db, &teacher, "Robotics");
            let outsider = create_user(&db, "Lee", Role::Student);
            let task = db.write_task(project.id, create_task("Wireframes", vec![]))
                .expect("Failed to create task");

            let result = db.write_task(project.id, TaskWrite::Update(UpdateTaskInput {
                id: task.id,
                title: Some("Renamed".to_string()),
                description: None,
                status: None,
                assignees: Some(vec![outsider.id]),
            }));
            assert!(matches!(result, Err(AppError::Validation(_))));
            assert_eq!(db.get_task(task.id).expect("Query failed").unwrap().title, "Wireframes");
        }
    }

    describe "persistence" {
        it "keeps data across reopening a file database" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("hub.db");

            let id = {
                let file_db = Database::open(path.clone()).expect("Failed to open");
                file_db.migrate().expect("Failed to migrate");
                create_user(&file_db, "Sam", Role::Student).id
            };

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Failed to migrate");
            assert!(reopened.get_user(id).expect("Query failed").is_some());
        }
    }
}
