//! RPC clients for the integration executors: GitLab project/push/MR
//! operations and Jira issue import/push. Both are typed request/response
//! surfaces over `reqwest`, kept free of any `kira-worker` or `kira-db`
//! dependency so they can be unit-tested in isolation.

pub mod gitlab;
pub mod jira;
