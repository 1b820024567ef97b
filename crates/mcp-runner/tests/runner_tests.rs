#![cfg(unix)]

use mcp_runner::{
    CapturedOutput, ChannelFailureKind, ConnectionDescriptor, ExitReason, McpRunner, Message,
    OutputSink, RunnerConfig, RunnerError, create_runner,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn runner(connection: ConnectionDescriptor) -> (McpRunner<mcp_runner::Uninitialized>, CapturedOutput, CapturedOutput) {
    let (out, stdout) = OutputSink::capture();
    let (err, stderr) = OutputSink::capture();
    let config = RunnerConfig::for_connection(connection);
    (McpRunner::new_with_output(config, out, err), stdout, stderr)
}

async fn wait_for_lines(output: &CapturedOutput, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while output.lines().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for output");
}

#[tokio::test]
async fn test_relays_until_shutdown() {
    let (runner, stdout, _) = runner(ConnectionDescriptor::new("/bin/cat"));
    let mut runner = runner.connect().await.unwrap();
    assert!(runner.is_ready());
    let token = runner.shutdown_token();

    let (mut parent, inbound) = tokio::io::duplex(1024);
    let script = async {
        parent
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\r\n")
            .await
            .unwrap();
        parent.write_all(b"garbage\n{\"jsonrpc\":\"2.0\",").await.unwrap();
        parent
            .write_all(b"\"method\":\"notifications/initialized\"}\n")
            .await
            .unwrap();
        wait_for_lines(&stdout, 2).await;
        token.cancel();
    };

    let (reason, ()) = tokio::join!(runner.run(inbound), script);

    assert_eq!(reason, ExitReason::Cleanup);
    assert_eq!(reason.code(), 0);
    assert_eq!(
        stdout.lines(),
        vec![
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        ]
    );
}

#[tokio::test]
async fn test_error_envelopes_are_forwarded_and_stderr_relayed() {
    let script = concat!(
        "echo '{\"jsonrpc\":\"2.0\",\"id\":7,\"error\":{\"code\":-32603,\"message\":\"internal\"}}'; ",
        "echo 'server warming up' >&2; ",
        "exec /bin/cat"
    );
    let (runner, stdout, stderr) =
        runner(ConnectionDescriptor::new("/bin/sh").with_args(["-c", script]));
    let mut runner = runner.connect().await.unwrap();
    let token = runner.shutdown_token();

    let (_parent, inbound) = tokio::io::duplex(64);
    let script = async {
        wait_for_lines(&stdout, 1).await;
        wait_for_lines(&stderr, 1).await;
        token.cancel();
    };
    let (reason, ()) = tokio::join!(runner.run(inbound), script);

    assert_eq!(reason, ExitReason::Cleanup);
    assert_eq!(
        stdout.lines(),
        vec![r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32603,"message":"internal"}}"#]
    );
    assert_eq!(stderr.lines(), vec!["server warming up"]);
}

#[tokio::test]
async fn test_declared_env_reaches_the_child() {
    let script = r#"echo "{\"jsonrpc\":\"2.0\",\"method\":\"env\",\"params\":{\"token\":\"$API_TOKEN\"}}"; exec /bin/cat"#;
    let (runner, stdout, _) = runner(
        ConnectionDescriptor::new("/bin/sh")
            .with_args(["-c", script])
            .with_env("API_TOKEN", "secret"),
    );
    let mut runner = runner.connect().await.unwrap();
    let token = runner.shutdown_token();

    let (_parent, inbound) = tokio::io::duplex(64);
    let script = async {
        wait_for_lines(&stdout, 1).await;
        token.cancel();
    };
    tokio::join!(runner.run(inbound), script);

    let message = Message::parse(&stdout.lines()[0]).unwrap();
    assert_eq!(message.as_value()["params"]["token"], "secret");
}

#[tokio::test]
async fn test_child_exit_mid_session_exits_non_zero() {
    let (runner, _, _) = runner(ConnectionDescriptor::new("/bin/sh").with_args(["-c", "exit 3"]));
    let mut runner = runner.connect().await.unwrap();

    let (_parent, inbound) = tokio::io::duplex(64);
    let reason = runner.run(inbound).await;

    assert_eq!(reason, ExitReason::UnexpectedTermination);
    assert_eq!(reason.code(), 1);
}

#[tokio::test]
async fn test_missing_server_exits_non_zero() {
    let mut runner = create_runner(ConnectionDescriptor::new("/nonexistent/mcp-server"))
        .await
        .unwrap();
    assert!(!runner.is_ready());

    let (_parent, inbound) = tokio::io::duplex(64);
    let reason = runner.run(inbound).await;

    assert_eq!(reason, ExitReason::ChannelFailure(ChannelFailureKind::SpawnFailure));
    assert_eq!(reason.code(), 1);
}

#[tokio::test]
async fn test_empty_command_is_a_configuration_error() {
    let result = create_runner(ConnectionDescriptor::new("")).await;
    assert!(matches!(result, Err(RunnerError::Configuration(_))));
}

#[tokio::test]
async fn test_send_and_cleanup() {
    let (runner, _, _) = runner(ConnectionDescriptor::new("/bin/cat"));
    let mut runner = runner.connect().await.unwrap();
    let message = Message::parse(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).unwrap();

    runner.send(&message).await.unwrap();

    assert_eq!(runner.cleanup().await, ExitReason::Cleanup);
    assert_eq!(runner.cleanup().await, ExitReason::Cleanup);
    assert!(runner.send(&message).await.is_err());
    assert!(!runner.is_ready());
}
