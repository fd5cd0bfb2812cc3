use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::k8s::exec::{ExecOutput, InputStream, RemoteExecutor, Workload};

/// Runs commands inside workload pods over the Kubernetes exec API.
#[derive(Clone)]
pub struct PodExecutor {
    client: Client,
}

impl PodExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn attach_params(workload: &Workload, stdin: bool) -> AttachParams {
        AttachParams {
            container: workload.container.clone(),
            stdout: true,
            stderr: true,
            stdin,
            tty: false,
            ..Default::default()
        }
    }

    async fn exec(
        &self,
        workload: &Workload,
        argv: Vec<String>,
        input: Option<InputStream>,
    ) -> Result<ExecOutput> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &workload.namespace);
        let command = argv.join(" ");
        debug!("exec in {}: {}", workload, command);

        let mut attached = api
            .exec(&workload.pod, argv, &Self::attach_params(workload, input.is_some()))
            .await
            .with_context(|| format!("Failed to exec `{}` in {}", command, workload))?;

        let status = attached.take_status();
        let stdin = attached.stdin();
        let stdout = attached.stdout();
        let stderr = attached.stderr();

        // stdin is fed while both output streams drain, so a chatty remote
        // command can never block the upload.
        let feed = async move {
            if let (Some(mut stdin), Some(mut input)) = (stdin, input) {
                while let Some(chunk) = input.recv().await {
                    stdin.write_all(&chunk).await?;
                }
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        let (fed, stdout, stderr) = tokio::join!(feed, read_all(stdout), read_all(stderr));
        let output = ExecOutput {
            stdout: stdout?,
            stderr: stderr?,
        };
        fed.with_context(|| format!("Failed to stream input to `{}` in {}", command, workload))?;

        attached
            .join()
            .await
            .with_context(|| format!("Exec of `{}` in {} did not finish", command, workload))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() != Some("Success") {
                    return Err(anyhow!(
                        "`{}` failed in {}: {} {}",
                        command,
                        workload,
                        status.message.unwrap_or_default(),
                        output.stderr.trim()
                    ));
                }
            }
        }

        Ok(output)
    }
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

#[async_trait]
impl RemoteExecutor for PodExecutor {
    async fn run(&self, workload: &Workload, argv: Vec<String>) -> Result<ExecOutput> {
        self.exec(workload, argv, None).await
    }

    async fn run_with_input(
        &self,
        workload: &Workload,
        argv: Vec<String>,
        input: InputStream,
    ) -> Result<ExecOutput> {
        self.exec(workload, argv, Some(input)).await
    }
}
