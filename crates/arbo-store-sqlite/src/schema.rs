//! SQL schema for the weekly SQLite store.
//!
//! Executed at connection startup; every statement is idempotent.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS localities (
    slug          TEXT PRIMARY KEY,  -- accent-folded lowercase join key
    name          TEXT NOT NULL,     -- canonical display name
    external_code TEXT,              -- e.g. IBGE municipality code
    lat           REAL,
    lon           REAL
);

-- One row per (locality, week start). Dates are anchor-aligned ISO dates.
CREATE TABLE IF NOT EXISTS weekly_cases (
    locality    TEXT    NOT NULL,
    date        TEXT    NOT NULL,
    cases       INTEGER NOT NULL CHECK (cases >= 0),
    total_cases INTEGER,
    PRIMARY KEY (locality, date)
);

CREATE TABLE IF NOT EXISTS weather_weekly (
    locality TEXT NOT NULL,
    date     TEXT NOT NULL,
    temp     REAL,   -- weekly mean, degrees Celsius
    prec     REAL,   -- weekly sum, millimetres
    umid     REAL,   -- weekly mean, relative humidity percent
    PRIMARY KEY (locality, date)
);

-- Derived table; rebuilt wholesale per locality, never merged.
CREATE TABLE IF NOT EXISTS features_weekly (
    locality     TEXT NOT NULL,
    date         TEXT NOT NULL,
    target       REAL NOT NULL,
    cases_lag1   REAL,
    cases_lag2   REAL,
    cases_lag3   REAL,
    cases_lag4   REAL,
    cases_lag5   REAL,
    cases_lag6   REAL,
    cases_lag7   REAL,
    cases_lag8   REAL,
    cases_lag9   REAL,
    cases_lag10  REAL,
    cases_lag11  REAL,
    cases_lag12  REAL,
    cases_mm2    REAL,
    cases_mm4    REAL,
    cases_mm8    REAL,
    temp         REAL,
    temp_lag1    REAL,
    temp_lag2    REAL,
    temp_lag4    REAL,
    temp_lag8    REAL,
    temp_mm2     REAL,
    temp_mm4     REAL,
    temp_mm8     REAL,
    prec         REAL,
    prec_lag1    REAL,
    prec_lag2    REAL,
    prec_lag4    REAL,
    prec_lag8    REAL,
    prec_mm2     REAL,
    prec_mm4     REAL,
    prec_mm8     REAL,
    umid         REAL,
    umid_lag1    REAL,
    umid_lag2    REAL,
    umid_lag4    REAL,
    umid_lag8    REAL,
    umid_mm2     REAL,
    umid_mm4     REAL,
    umid_mm8     REAL,
    seasonal_sin REAL,
    seasonal_cos REAL,
    month        INTEGER,
    PRIMARY KEY (locality, date)
);

-- Forecasts are strictly append-only.
CREATE TABLE IF NOT EXISTS forecasts (
    locality   TEXT    NOT NULL,
    run_at     TEXT    NOT NULL,   -- RFC 3339 UTC
    model_name TEXT    NOT NULL,
    horizon    INTEGER NOT NULL CHECK (horizon >= 1),
    start_date TEXT    NOT NULL,
    yhat       TEXT    NOT NULL,   -- JSON array, one value per week
    lower      TEXT    NOT NULL,   -- JSON array
    upper      TEXT    NOT NULL,   -- JSON array
    scaling    TEXT    NOT NULL,   -- 'loaded' | 'fitted_on_history' | 'none'
    confidence TEXT    NOT NULL,   -- 'model' | 'low'
    metadata   TEXT    NOT NULL DEFAULT '{}',
    PRIMARY KEY (locality, run_at, model_name)
);

CREATE TRIGGER IF NOT EXISTS forecasts_no_update
BEFORE UPDATE ON forecasts
BEGIN
    SELECT RAISE(ABORT, 'forecasts are append-only');
END;

CREATE TRIGGER IF NOT EXISTS forecasts_no_delete
BEFORE DELETE ON forecasts
BEGIN
    SELECT RAISE(ABORT, 'forecasts are append-only');
END;

CREATE INDEX IF NOT EXISTS weather_weekly_date ON weather_weekly(date);
CREATE INDEX IF NOT EXISTS weekly_cases_date   ON weekly_cases(date);

PRAGMA user_version = 1;
";
