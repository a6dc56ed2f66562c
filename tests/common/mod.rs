//! Shared fixtures for the integration suite.
//!
//! The fixture views model a small laboratory information system: accounts,
//! samples, projects, worksets, and an audit log, each indexed the way a
//! real deployment would ask for them.

use once_cell::sync::Lazy;
use std::time::Duration;
use vantagedb::{DocId, Document, Reduce, Value, Vantage, ViewDefinition};

static LOGGING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
        .with_test_writer()
        .try_init();
});

const WAIT: Duration = Duration::from_secs(5);

/// Index account documents by name; value is the full name, or null.
pub fn account_name() -> ViewDefinition {
    ViewDefinition::builder("account/name")
        .entity("account")
        .map(|doc, out| {
            let Some(name) = doc.field("name") else { return };
            let fullname = doc.field("fullname").cloned().unwrap_or(Value::Null);
            out.emit(name.clone(), fullname);
        })
        .build()
}

/// Index sample documents by name; value is the project.
pub fn sample_name() -> ViewDefinition {
    ViewDefinition::builder("sample/name")
        .entity("sample")
        .map(|doc, out| {
            let Some(name) = doc.field("name") else { return };
            let project = doc.field("project").cloned().unwrap_or(Value::Null);
            out.emit(name.clone(), project);
        })
        .build()
}

/// Fan out sample documents over their tags; value is the sample name.
pub fn sample_tag() -> ViewDefinition {
    ViewDefinition::builder("sample/tag")
        .entity("sample")
        .map(|doc, out| {
            let (Some(Value::Array(tags)), Some(name)) =
                (doc.field("tags"), doc.field("name"))
            else {
                return;
            };
            for tag in tags {
                out.emit(tag.clone(), name.clone());
            }
        })
        .build()
}

/// Index sample documents by altname when present; value is the project.
pub fn sample_altname() -> ViewDefinition {
    ViewDefinition::builder("sample/altname")
        .entity("sample")
        .map(|doc, out| {
            let Some(altname) = doc.field("altname") else { return };
            let project = doc.field("project").cloned().unwrap_or(Value::Null);
            out.emit(altname.clone(), project);
        })
        .build()
}

/// Count projects per application: emits `(application, 1)` with a count
/// reduce.
pub fn project_application_count() -> ViewDefinition {
    ViewDefinition::builder("project/application_count")
        .entity("project")
        .map(|doc, out| {
            let application = doc.field("application").cloned().unwrap_or(Value::Null);
            out.emit(application, 1i64);
        })
        .reduce(Reduce::Count)
        .build()
}

/// Index project documents by customer; value is the project name.
pub fn project_customer() -> ViewDefinition {
    ViewDefinition::builder("project/customer")
        .entity("project")
        .map(|doc, out| {
            let customer = doc.field("customer").cloned().unwrap_or(Value::Null);
            let name = doc.field("name").cloned().unwrap_or(Value::Null);
            out.emit(customer, name);
        })
        .build()
}

/// Fan out workset documents over their member sample names; value null.
pub fn workset_sample() -> ViewDefinition {
    ViewDefinition::builder("workset/sample")
        .entity("workset")
        .map(|doc, out| {
            let Some(Value::Array(samples)) = doc.field("samples") else {
                return;
            };
            for sample in samples {
                out.emit(sample.clone(), Value::Null);
            }
        })
        .build()
}

/// Index log entries by `[docid, timestamp]`; value is the action.
pub fn log_docid_timestamp() -> ViewDefinition {
    ViewDefinition::builder("log/docid_timestamp")
        .entity("log")
        .map(|doc, out| {
            let (Some(docid), Some(timestamp)) =
                (doc.field("docid"), doc.field("timestamp"))
            else {
                return;
            };
            let action = doc.field("action").cloned().unwrap_or(Value::Null);
            out.emit(
                Value::Array(vec![docid.clone(), timestamp.clone()]),
                action,
            );
        })
        .build()
}

/// Cross-entity index of every timestamped document; value is
/// `[entity, name]`.
pub fn all_timestamp() -> ViewDefinition {
    ViewDefinition::builder("all/timestamp")
        .all_entities()
        .map(|doc, out| {
            let (Some(timestamp), Some(entity)) =
                (doc.field("timestamp"), doc.entity.as_deref())
            else {
                return;
            };
            let name = doc.field("name").cloned().unwrap_or(Value::Null);
            out.emit(
                timestamp.clone(),
                Value::Array(vec![Value::from(entity), name]),
            );
        })
        .build()
}

/// A `Vantage` instance with the full fixture view set registered.
pub fn fixture_engine() -> Vantage {
    Lazy::force(&LOGGING);
    let db = Vantage::with_defaults();
    for view in [
        account_name(),
        sample_name(),
        sample_tag(),
        sample_altname(),
        project_application_count(),
        project_customer(),
        workset_sample(),
        log_docid_timestamp(),
        all_timestamp(),
    ] {
        db.register(view).unwrap();
    }
    db
}

/// Wait until `view` has processed `revision` for the document, panicking
/// on a missed barrier so test failures point at the pipeline rather than
/// at a stale read.
pub fn settle(db: &Vantage, view: &str, doc_id: &DocId, revision: u64) {
    assert!(
        db.wait_for(view, doc_id, revision, WAIT).unwrap(),
        "view '{view}' did not process {doc_id}@{revision} in time"
    );
}

/// Convenience: settle one view for a document just written.
pub fn settle_doc(db: &Vantage, view: &str, doc: &Document) {
    settle(db, view, &doc.id, doc.revision);
}
