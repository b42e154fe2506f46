use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profiles (
            id                      TEXT PRIMARY KEY,
            auth_id                 TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            email                   TEXT NOT NULL,
            username                TEXT UNIQUE,
            display_name            TEXT,
            bio                     TEXT,
            avatar_url              TEXT,
            social_links            TEXT NOT NULL DEFAULT '[]',
            subscription_tier       TEXT NOT NULL DEFAULT 'free',
            subscription_status     TEXT NOT NULL DEFAULT 'inactive',
            stripe_customer_id      TEXT,
            stripe_subscription_id  TEXT,
            subscription_end        TEXT,
            created_at              TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_profiles_customer
            ON profiles(stripe_customer_id);

        CREATE TABLE IF NOT EXISTS categories (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            emoji       TEXT,
            order_index INTEGER NOT NULL,
            is_public   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            UNIQUE(user_id, name)
        );

        -- Renames cascade into bookmarks; deletes do not, so bookmarks must go first.
        CREATE TABLE IF NOT EXISTS bookmarks (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            category_name   TEXT NOT NULL,
            site_name       TEXT NOT NULL,
            site_url        TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(user_id, category_name, site_name, site_url),
            FOREIGN KEY (user_id, category_name)
                REFERENCES categories(user_id, name) ON UPDATE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_bookmarks_category
            ON bookmarks(user_id, category_name);

        CREATE TABLE IF NOT EXISTS inbox_messages (
            id                  TEXT PRIMARY KEY,
            sender_id           TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            recipient_id        TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            category_name       TEXT NOT NULL,
            category_emoji      TEXT,
            category_is_public  INTEGER NOT NULL,
            note                TEXT,
            share_token         TEXT NOT NULL UNIQUE,
            is_read             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_inbox_recipient
            ON inbox_messages(recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            target_kind TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(user_id, target_kind, target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_target
            ON reactions(target_kind, target_id);

        CREATE TRIGGER IF NOT EXISTS trg_category_reactions_cleanup
            AFTER DELETE ON categories
        BEGIN
            DELETE FROM reactions WHERE target_kind = 'category' AND target_id = OLD.id;
        END;

        CREATE TRIGGER IF NOT EXISTS trg_message_reactions_cleanup
            AFTER DELETE ON inbox_messages
        BEGIN
            DELETE FROM reactions WHERE target_kind = 'message' AND target_id = OLD.id;
        END;

        CREATE TABLE IF NOT EXISTS subscription_history (
            id                      TEXT PRIMARY KEY,
            user_id                 TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            plan_type               TEXT NOT NULL,
            stripe_subscription_id  TEXT,
            created_at              TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
