//! The conformance test cases and the setup/cleanup phases around them.
//!
//! Each case builds its requests from the fixture set it is given, sends
//! them one at a time, and stops at the first mismatch.  Read-only cases
//! use the mode-selected set.  Destructive cases only ever touch the
//! harness-owned (prepared) set.

use http::{Method, StatusCode};
use tracing::{debug, info, warn};

use crate::error_response::ErrorResponse;
use crate::errors::HarnessError;
use crate::fixtures::{random_bucket_name, select_range, FixtureSet, NAME_PREFIX};
use crate::hash::compute_hash;
use crate::request::{
    new_get_object_range_req, new_get_object_req, new_list_buckets_req, new_list_objects_req,
    new_make_bucket_req, new_put_object_req, new_remove_bucket_req, new_remove_object_req,
};
use crate::runner::TestContext;
use crate::verify::{self, Mismatch};

/// Create the prepared buckets and upload the prepared objects into the
/// first of them.  Any failure here aborts the run.
pub async fn setup(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let server = &ctx.server;
    for bucket in ctx.fixtures.prepared.buckets.iter_mut() {
        let req = new_make_bucket_req(&bucket.name, &server.region)?;
        let res = server.exec_request(Method::PUT, &req).await?;
        verify::make_bucket_verify(&res, StatusCode::OK, &ErrorResponse::none())?;
        bucket.created = Some(chrono::Utc::now());
        debug!(bucket = %bucket.name, "created fixture bucket");
    }

    let set = &ctx.fixtures.prepared;
    if set.objects.is_empty() {
        return Ok(());
    }
    let bucket = object_bucket(set)?;
    for object in &set.objects {
        let hash = compute_hash(object.body.as_ref()).map_err(HarnessError::Build)?;
        let req = new_put_object_req(bucket, &object.key, object.body.clone())?;
        let res = server.exec_request(Method::PUT, &req).await?;
        verify::put_object_verify(&res, &hash.md5_hex())?;
        debug!(bucket, key = %object.key, size = object.size, "uploaded fixture object");
    }
    info!(
        "Prepared {} buckets and {} objects",
        set.buckets.len(),
        set.objects.len()
    );
    Ok(())
}

/// Best-effort removal of whatever prepared fixtures are still on the
/// target.  Failures are logged and otherwise ignored.
pub async fn cleanup(ctx: &mut TestContext) {
    let server = &ctx.server;
    let set = &mut ctx.fixtures.prepared;
    if let Some(bucket) = set.buckets.first().map(|b| b.name.clone()) {
        for object in set.objects.drain(..) {
            let result = match new_remove_object_req(&bucket, &object.key) {
                Ok(req) => server.exec_request(Method::DELETE, &req).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(bucket = %bucket, key = %object.key, "cleanup failed: {e}");
            }
        }
    }
    for bucket in set.buckets.drain(..) {
        let result = match new_remove_bucket_req(&bucket.name) {
            Ok(req) => server.exec_request(Method::DELETE, &req).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(bucket = %bucket.name, "cleanup failed: {e}");
        }
    }
}

/// `GET /` lists every bucket of the selected set.
pub async fn list_buckets(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let set = ctx.fixtures.select(ctx.mode);
    let req = new_list_buckets_req()?;
    let res = ctx.server.exec_request(Method::GET, &req).await?;
    verify::list_buckets_verify(&res, &set.buckets)?;
    Ok(())
}

/// A fresh bucket can be created.  It joins the prepared set so the
/// remove cases delete it again.
pub async fn make_bucket(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let name = random_bucket_name(&mut ctx.rng, NAME_PREFIX);
    let req = new_make_bucket_req(&name, &ctx.server.region)?;
    let res = ctx.server.exec_request(Method::PUT, &req).await?;
    if res.status.is_success() {
        ctx.fixtures.track_created_bucket(name);
    }
    verify::make_bucket_verify(&res, StatusCode::OK, &ErrorResponse::none())?;
    Ok(())
}

/// Every object of the selected set reads back whole.
pub async fn get_object(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let set = ctx.fixtures.select(ctx.mode);
    let bucket = object_bucket(set)?;
    for object in &set.objects {
        let req = new_get_object_req(bucket, &object.key)?;
        let res = ctx.server.exec_request(Method::GET, &req).await?;
        verify::get_object_verify(&res, &object.body, StatusCode::OK)?;
    }
    Ok(())
}

/// Every object of the selected set serves a random inclusive byte range
/// with 206.
pub async fn get_object_range(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let set = ctx.fixtures.select(ctx.mode);
    let bucket = object_bucket(set)?;
    for object in &set.objects {
        let Some((start, end)) = select_range(&mut ctx.rng, object.size) else {
            debug!(key = %object.key, "skipping empty object");
            continue;
        };
        let oracle = object
            .body
            .get(start as usize..=end as usize)
            .ok_or_else(|| {
                HarnessError::Fixture(format!(
                    "object {} has {} bytes but declares {}",
                    object.key,
                    object.body.len(),
                    object.size
                ))
            })?;
        let req = new_get_object_range_req(bucket, &object.key, start, end)?;
        let res = ctx.server.exec_request(Method::GET, &req).await?;
        debug!(key = %object.key, start, end, "checking range");
        verify::get_object_verify(&res, oracle, StatusCode::PARTIAL_CONTENT)?;
    }
    Ok(())
}

/// Upper bound on ListObjectsV2 pages followed for one listing.
const MAX_LIST_PAGES: usize = 1000;

/// The object bucket of the selected set lists every object with its size,
/// following continuation tokens across pages.
pub async fn list_objects(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let set = ctx.fixtures.select(ctx.mode);
    let bucket = object_bucket(set)?;
    let mut listed = Vec::new();
    let mut token: Option<String> = None;
    for page in 1..=MAX_LIST_PAGES {
        let req = new_list_objects_req(bucket, token.as_deref())?;
        let res = ctx.server.exec_request(Method::GET, &req).await?;
        let listing = verify::list_objects_page_verify(&res, bucket)?;
        debug!(
            page,
            keys = listing.contents.len(),
            truncated = listing.is_truncated,
            "listed page"
        );
        listed.extend(listing.contents);
        if !listing.is_truncated {
            verify::verify_listed_objects(&listed, &set.objects)?;
            return Ok(());
        }
        token = Some(listing.next_continuation_token);
    }
    Err(Mismatch::Body(format!("listing still truncated after {MAX_LIST_PAGES} pages")).into())
}

/// Every prepared object can be deleted.  Removed objects leave the set.
pub async fn remove_object(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let set = &mut ctx.fixtures.prepared;
    if set.objects.is_empty() {
        return Ok(());
    }
    let bucket = object_bucket(set)?.to_string();
    while let Some(object) = set.objects.first() {
        let req = new_remove_object_req(&bucket, &object.key)?;
        let res = ctx.server.exec_request(Method::DELETE, &req).await?;
        verify::remove_object_verify(&res, StatusCode::NO_CONTENT)?;
        set.objects.remove(0);
    }
    Ok(())
}

/// Every prepared bucket can be deleted.  Removed buckets leave the set.
pub async fn remove_bucket_exists(ctx: &mut TestContext) -> Result<(), HarnessError> {
    empty_object_bucket(ctx).await?;
    let set = &mut ctx.fixtures.prepared;
    while let Some(bucket) = set.buckets.first() {
        let req = new_remove_bucket_req(&bucket.name)?;
        let res = ctx.server.exec_request(Method::DELETE, &req).await?;
        verify::remove_bucket_verify(&res, StatusCode::NO_CONTENT, &ErrorResponse::none())?;
        set.buckets.remove(0);
    }
    Ok(())
}

/// Deleting a bucket that was never created yields 404 `NoSuchBucket`.
pub async fn remove_bucket_dne(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let name = random_bucket_name(&mut ctx.rng, "");
    let expected = ErrorResponse::no_such_bucket(&name);
    let req = new_remove_bucket_req(&name)?;
    let res = ctx.server.exec_request(Method::DELETE, &req).await?;
    verify::remove_bucket_verify(&res, StatusCode::NOT_FOUND, &expected)?;
    Ok(())
}

/// Delete prepared objects still in their bucket so it can be removed.
/// Nothing is checked here; RemoveObject covers these responses.
async fn empty_object_bucket(ctx: &mut TestContext) -> Result<(), HarnessError> {
    let set = &mut ctx.fixtures.prepared;
    if set.objects.is_empty() {
        return Ok(());
    }
    let bucket = object_bucket(set)?.to_string();
    while let Some(object) = set.objects.first() {
        let req = new_remove_object_req(&bucket, &object.key)?;
        let res = ctx.server.exec_request(Method::DELETE, &req).await?;
        debug!(key = %object.key, status = %res.status, "emptied before bucket removal");
        set.objects.remove(0);
    }
    Ok(())
}

fn object_bucket(set: &FixtureSet) -> Result<&str, HarnessError> {
    set.object_bucket()
        .map(|b| b.name.as_str())
        .ok_or_else(|| HarnessError::Fixture("no bucket to hold objects".to_string()))
}
