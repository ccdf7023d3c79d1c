mod rounds;

use oracle_backend::AppError;

use crate::support::{test_config, ScriptedJudge, SharedBackends, TestNode};

/// Two nodes on one set of shared backends.
async fn pair(judge: impl Fn() -> ScriptedJudge) -> Result<(TestNode, TestNode), AppError> {
    let config = test_config();
    let shared = SharedBackends::new(&config);
    let a = TestNode::join(&shared, "node-a", config.clone(), judge()).await?;
    let b = TestNode::join(&shared, "node-b", config, judge()).await?;
    Ok((a, b))
}
