pub(super) const TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    uid TEXT UNIQUE,
    title TEXT,
    start_ts INTEGER,
    end_ts INTEGER,
    status TEXT DEFAULT 'pending',
    red_alert INTEGER DEFAULT 0
);
"#;

pub(super) const TASKS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
"#;
