use super::{Migration, SimpleSqlMigration};

pub fn migration() -> impl Migration {
    SimpleSqlMigration {
        serial_number: 0,
        sql: vec![
            r#"
            CREATE TABLE users (
                id UUID PRIMARY KEY,
                public_key TEXT UNIQUE,
                balance_sats BIGINT NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"CREATE INDEX user_public_key ON users (public_key)"#,
            r#"
            CREATE TABLE lightning_deposits (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                amount_sats BIGINT NOT NULL,
                invoice_id TEXT NOT NULL,
                lnurl TEXT UNIQUE NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL,
                paid TIMESTAMP WITH TIME ZONE
            )"#,
            r#"CREATE INDEX lightning_deposit_user ON lightning_deposits (user_id)"#,
            r#"
            CREATE TABLE pix_payments (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users,
                amount_brl_cents BIGINT NOT NULL,
                amount_sats BIGINT NOT NULL,
                payee_name TEXT NOT NULL,
                pix_key TEXT,
                pix_qr_code TEXT,
                settlement_id TEXT NOT NULL,
                uncollected_sats BIGINT NOT NULL,
                paid BOOLEAN NOT NULL,
                created TIMESTAMP WITH TIME ZONE NOT NULL
            )"#,
            r#"CREATE INDEX pix_payment_user ON pix_payments (user_id)"#,
        ],
    }
}
