#![deny(warnings)]

pub static DDL_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS images (
       id              INTEGER PRIMARY KEY AUTOINCREMENT,
       hash            TEXT NOT NULL UNIQUE,
       name            TEXT NOT NULL,
       title           TEXT NOT NULL,
       uploaded        TEXT NOT NULL,
       thumbnail       BLOB NOT NULL,
       thumbnail_type  TEXT NOT NULL
     )",
    "CREATE TABLE IF NOT EXISTS tags (
       image     INTEGER NOT NULL,
       tag       TEXT NOT NULL,

       PRIMARY KEY (image, tag),
       FOREIGN KEY (image) REFERENCES images(id) ON DELETE CASCADE
     )",
    "CREATE INDEX IF NOT EXISTS images_uploaded ON images (uploaded DESC)",
];
