use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, from_document, oid::ObjectId, to_document, Bson, Document};
use mongodb::{options::ClientOptions, Client, Collection, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PortalError, Result};
use crate::models::{Comment, Record};
use crate::remote::CommentRemote;

pub const SUGGESTIONS: &str = "sugestoes";
pub const FEEDBACK: &str = "feedback";
pub const COMMENTS: &str = "prompt_comments";
pub const ADMINS: &str = "admins";
pub const USERS: &str = "sugestoes_users";

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        Ok(MongoDB { client, db })
    }

    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

pub fn object_id(id: &str) -> Result<ObjectId> {
    Ok(ObjectId::parse_str(id)?)
}

/// Serializes a value for insertion; the database assigns `_id`.
pub fn to_stored<T: Serialize>(value: &T) -> Result<Document> {
    to_document(value).map_err(|e| PortalError::Remote(format!("bson encode: {}", e)))
}

/// Splits `_id` off a stored document and decodes the remaining fields.
pub fn into_record<T: DeserializeOwned>(mut document: Document) -> Result<Record<T>> {
    let id = match document.remove("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::String(s)) => s,
        other => {
            return Err(PortalError::Remote(format!("document without usable _id: {:?}", other)))
        }
    };
    let data = from_document(document).map_err(|e| PortalError::Remote(format!("bson decode: {}", e)))?;
    Ok(Record { id, data })
}

pub fn inserted_id(result: &mongodb::results::InsertOneResult) -> Result<String> {
    match &result.inserted_id {
        Bson::ObjectId(oid) => Ok(oid.to_hex()),
        other => Err(PortalError::Remote(format!("unexpected inserted id {:?}", other))),
    }
}

/// Runs a find and decodes every document into a record.
pub async fn find_records<T: DeserializeOwned>(
    coll: &Collection<Document>,
    filter: Document,
    sort: Document,
) -> Result<Vec<Record<T>>> {
    let docs: Vec<Document> = coll.find(filter).sort(sort).await?.try_collect().await?;
    docs.into_iter().map(into_record).collect()
}

/// Orders records newest first by their decoded timestamp. `createdAt` is
/// stored as RFC 3339 text, whose lexical order is wrong within a second.
pub fn newest_records_first<T>(records: &mut [Record<T>], created_at: impl Fn(&T) -> DateTime<Utc>) {
    records.sort_by(|a, b| created_at(&b.data).cmp(&created_at(&a.data)));
}

/// `CommentRemote` over the `prompt_comments` collection.
pub struct MongoCommentStore {
    db: Database,
}

impl MongoCommentStore {
    pub fn new(mongodb: &MongoDB) -> Self {
        Self { db: mongodb.db.clone() }
    }

    fn comments(&self) -> Collection<Document> {
        self.db.collection::<Document>(COMMENTS)
    }
}

fn comment_document(comment: &Comment) -> Result<Document> {
    let mut document = to_stored(comment)?;
    document.remove("id");
    document.remove("isLocal");
    Ok(document)
}

fn comment_from_document(document: Document) -> Result<Comment> {
    let record: Record<Document> = into_record(document)?;
    let mut fields = record.data;
    fields.insert("id", record.id);
    fields.insert("isLocal", false);
    from_document(fields).map_err(|e| PortalError::Remote(format!("bson decode: {}", e)))
}

#[async_trait]
impl CommentRemote for MongoCommentStore {
    async fn list(&self, prompt_id: &str) -> Result<Vec<Comment>> {
        let docs: Vec<Document> = self
            .comments()
            .find(doc! { "promptId": prompt_id })
            .sort(doc! { "createdAt": -1 })
            .await?
            .try_collect()
            .await?;
        let mut comments = docs
            .into_iter()
            .map(comment_from_document)
            .collect::<Result<Vec<_>>>()?;
        // createdAt is stored as RFC 3339 text, whose lexical order breaks within a second
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn insert(&self, comment: &Comment) -> Result<String> {
        let result = self.comments().insert_one(comment_document(comment)?).await?;
        inserted_id(&result)
    }

    async fn delete(&self, comment_id: &str) -> Result<()> {
        let res = self.comments().delete_one(doc! { "_id": object_id(comment_id)? }).await?;
        if res.deleted_count == 0 {
            return Err(PortalError::not_found("Comment", comment_id));
        }
        Ok(())
    }

    async fn increment_likes(&self, comment_id: &str) -> Result<()> {
        let res = self
            .comments()
            .update_one(doc! { "_id": object_id(comment_id)? }, doc! { "$inc": { "likes": 1 } })
            .await?;
        if res.matched_count == 0 {
            return Err(PortalError::not_found("Comment", comment_id));
        }
        Ok(())
    }

    async fn set_flagged(&self, comment_id: &str, flagged: bool) -> Result<()> {
        let res = self
            .comments()
            .update_one(doc! { "_id": object_id(comment_id)? }, doc! { "$set": { "flagged": flagged } })
            .await?;
        if res.matched_count == 0 {
            return Err(PortalError::not_found("Comment", comment_id));
        }
        Ok(())
    }

    async fn delete_for_prompt(&self, prompt_id: &str) -> Result<u64> {
        let res = self.comments().delete_many(doc! { "promptId": prompt_id }).await?;
        Ok(res.deleted_count)
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentAuthor, Suggestion};

    #[test]
    fn comment_documents_drop_local_only_fields() {
        let author = CommentAuthor { name: "Ana".into(), session_id: "s1".into(), ..Default::default() };
        let comment = Comment::local("abc123", "oi", &author, Utc::now());
        let document = comment_document(&comment).unwrap();
        assert!(document.get("id").is_none());
        assert!(document.get("isLocal").is_none());
        assert_eq!(document.get_str("promptId").unwrap(), "abc123");

        let mut stored = document.clone();
        let oid = ObjectId::new();
        stored.insert("_id", oid);
        let back = comment_from_document(stored).unwrap();
        assert_eq!(back.id, oid.to_hex());
        assert!(!back.is_local);
        assert_eq!(back.text, "oi");
    }

    #[test]
    fn records_sort_by_time_not_by_stored_text() {
        let whole = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let later = whole + chrono::Duration::milliseconds(500);
        // a whole second sorts after its own fraction as text
        assert!("2026-03-01T12:00:00Z" > "2026-03-01T12:00:00.500Z");

        let mut records = vec![
            Record { id: "a".to_string(), data: whole },
            Record { id: "b".to_string(), data: later },
        ];
        newest_records_first(&mut records, |t| *t);
        assert_eq!(records[0].id, "b");
    }

    #[test]
    fn into_record_requires_an_id() {
        let missing = doc! { "title": "x" };
        assert!(into_record::<Suggestion>(missing).is_err());
        assert!(object_id("not-an-oid").is_err());
    }
}
