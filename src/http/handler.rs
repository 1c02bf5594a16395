use crate::cli::app_config::Cli;
use crate::http::client::Client;
use crate::response::res::{ReportStyle, StatReport};
use crate::trace::{with_http_stat, StatRecorder, TraceContext};
use anyhow::Context;
use bytes::Bytes;
use futures::StreamExt;
use http::header::{
    HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT,
};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, Uri};
use indicatif::{ProgressBar, ProgressStyle};
use std::cmp::min;
use std::fs::OpenOptions;
use std::io::Write as WriteStd;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

const MAX_REDIRECTS: u8 = 10;

/// Runs the request `cli.repeat` times over one client, printing a report
/// after each.
pub async fn http_stat_requests(cli: &Cli) -> Result<Vec<StatReport>, anyhow::Error> {
    let client = build_client(cli)?;
    let style = report_style(cli);

    let mut reports = Vec::with_capacity(cli.repeat as usize);
    for attempt in 1..=cli.repeat {
        if cli.repeat > 1 {
            debug!("Request {}/{}", attempt, cli.repeat);
        }
        let report = timed_request(cli, &client).await?;
        println!("{}", report.render(style)?);
        reports.push(report);
    }
    Ok(reports)
}

fn report_style(cli: &Cli) -> ReportStyle {
    if cli.json {
        ReportStyle::Json
    } else if cli.compact {
        ReportStyle::Compact
    } else {
        ReportStyle::Verbose
    }
}

fn build_client(cli: &Cli) -> Result<Client, anyhow::Error> {
    let mut builder = Client::builder().danger_accept_invalid_certs(cli.skip_certificate_validate);
    if let Some(file_path) = cli.certificate_path_option.as_ref() {
        builder = builder.ca_file(file_path);
    }
    if let Some(secs) = cli.connect_timeout {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }
    builder.build()
}

async fn timed_request(cli: &Cli, client: &Client) -> Result<StatReport, anyhow::Error> {
    let recorder = StatRecorder::new();
    let ctx = with_http_stat(TraceContext::new(), &recorder);

    let fetch = async {
        let (url, res) = request_with_redirects(cli, client, &ctx).await?;
        let status = res.status();
        let version = res.version();
        let (parts, incoming) = res.into_parts();

        let (body_len, body_path) = match cli.file_path_option.as_ref() {
            Some(file_path) => {
                let content_length = parts
                    .headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                let written = download_file_with_progress(
                    file_path,
                    content_length,
                    !cli.json,
                    BodyStream::new(incoming),
                )
                .await?;
                (written, Some(file_path.clone()))
            }
            None => (discard_body(BodyStream::new(incoming)).await?, None),
        };
        recorder.end(Instant::now());

        Ok::<_, anyhow::Error>(StatReport {
            url: url.to_string(),
            status,
            version,
            body_len,
            body_path,
            stat: recorder.snapshot(),
        })
    };

    timeout(Duration::from_secs(cli.max_time), fetch)
        .await
        .map_err(|_| anyhow!("Request timed out after {} seconds", cli.max_time))?
}

fn is_followable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Every hop is sent with the same context, so a followed redirect keeps
/// stamping the same timeline.
async fn request_with_redirects(
    cli: &Cli,
    client: &Client,
    ctx: &TraceContext,
) -> Result<(Url, Response<Incoming>), anyhow::Error> {
    let mut current_url: Url = cli.url.parse().context("Failed to parse initial URL")?;
    let mut as_get = false;

    for i in 0..MAX_REDIRECTS {
        let uri: Uri = current_url.as_str().parse()?;
        let mut request = build_request(cli, &uri, as_get)?;
        let sent_method = request.method().clone();
        ctx.clone().attach(&mut request);

        let res = client.request(request).await?;
        if cli.verbosity >= 1 {
            debug!("< {:?} {}", res.version(), res.status());
            for (key, value) in res.headers().iter() {
                debug!("< {}: {}", key, value.to_str().unwrap_or("<binary>"));
            }
            debug!("<");
        }

        if !(cli.follow_redirects && is_followable(res.status())) {
            return Ok((current_url, res));
        }

        let location = res
            .headers()
            .get(LOCATION)
            .ok_or_else(|| anyhow!("Redirect response missing 'location' header"))?
            .to_str()?
            .to_string();
        as_get = as_get || redirect_drops_body(res.status(), &sent_method);
        // Drained so the connection can go back to the pool.
        res.into_body().collect().await?;
        current_url = current_url.join(&location)?;
        debug!(
            "Redirecting to: {current_url} ({}/{MAX_REDIRECTS})",
            i + 1
        );
    }

    Err(anyhow!(
        "Exceeded maximum number of redirects ({MAX_REDIRECTS})"
    ))
}

/// 303 turns anything but HEAD into a bodyless GET; 301 and 302 do the
/// same to POST.
fn redirect_drops_body(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => *method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => *method == Method::POST,
        _ => false,
    }
}

/// With `as_get`, the method and body flags are ignored and a plain GET is
/// built.
fn build_request(
    cli: &Cli,
    uri: &Uri,
    as_get: bool,
) -> Result<Request<Full<Bytes>>, anyhow::Error> {
    let mut method = String::from("GET");
    let mut content_type_option = None;
    let body_option = cli.body_option.as_ref().filter(|_| !as_get);

    if body_option.is_some() {
        method = String::from("POST");
        content_type_option = Some("application/x-www-form-urlencoded");
    }
    if let Some(method_userdefined) = cli.method_option.as_ref().filter(|_| !as_get) {
        method = method_userdefined.clone();
    }

    let body_bytes = body_option.map_or(Bytes::new(), |body| Bytes::from(body.clone()));
    let mut request = Request::builder()
        .method(method.as_str())
        .uri(uri.clone())
        .body(Full::new(body_bytes))?;

    let header_map = request.headers_mut();
    if let Some(content_type) = content_type_option {
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("*/*"));
    let user_agent = cli
        .user_agent_option
        .as_deref()
        .unwrap_or(concat!("httpstat/", env!("CARGO_PKG_VERSION")));
    header_map.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    if let Some(cookie) = cli.cookie_option.as_ref() {
        header_map.insert(COOKIE, HeaderValue::from_str(cookie)?);
    }

    for x in &cli.headers {
        let split: Vec<&str> = x.splitn(2, ':').collect();
        if split.len() == 2 {
            header_map.insert(
                HeaderName::from_str(split[0].trim())?,
                HeaderValue::from_str(split[1].trim_start())?,
            );
        } else {
            return Err(anyhow!("header error: '{}'", x));
        }
    }

    if cli.verbosity >= 1 {
        debug!("> {} {} {:?}", request.method(), uri, request.version());
        for (key, value) in request.headers().iter() {
            debug!("> {}: {}", key, value.to_str().unwrap_or("<binary>"));
        }
        debug!(">");
    }

    Ok(request)
}

async fn discard_body(mut body_stream: BodyStream<Incoming>) -> Result<u64, anyhow::Error> {
    let mut read = 0u64;
    while let Some(frame) = body_stream.next().await {
        if let Ok(bytes) = frame
            .context("Error while reading response body")?
            .into_data()
        {
            read += bytes.len() as u64;
        }
    }
    Ok(read)
}

async fn download_file_with_progress(
    file_path: &str,
    total_size: Option<u64>,
    show_progress: bool,
    mut body_stream: BodyStream<Incoming>,
) -> Result<u64, anyhow::Error> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(file_path)
        .context(format!("Failed to open or create file: {}", file_path))?;

    let pb = match (show_progress, total_size) {
        (false, _) => ProgressBar::hidden(),
        (true, Some(total)) => ProgressBar::new(total),
        (true, None) => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )?
        .progress_chars("#>-"),
    );

    let mut downloaded = 0;
    while let Some(chunk_result) = body_stream.next().await {
        let bytes = match chunk_result
            .context("Error while downloading file stream")?
            .into_data()
        {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };

        file.write_all(&bytes)
            .context("Error writing chunk to file")?;
        downloaded += bytes.len() as u64;
        pb.set_position(total_size.map_or(downloaded, |total| min(downloaded, total)));
    }

    pb.finish_and_clear();
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use hyper::body::Body;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("httpstat").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn plain_get_by_default() {
        let cli = cli(&["http://example.com/"]);
        let request =
            build_request(&cli, &"http://example.com/".parse().unwrap(), false).unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.headers()[ACCEPT], "*/*");
        assert!(request.headers()[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("httpstat/"));
        assert!(request.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn data_turns_into_form_post_unless_method_given() {
        let uri: Uri = "http://example.com/".parse().unwrap();

        let post = build_request(&cli(&["-d", "a=b", "http://example.com/"]), &uri, false).unwrap();
        assert_eq!(post.method(), "POST");
        assert_eq!(
            post.headers()[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );

        let put = build_request(&cli(&["-X", "PUT", "-d", "a=b", "http://example.com/"]), &uri, false)
            .unwrap();
        assert_eq!(put.method(), "PUT");
    }

    #[test]
    fn custom_headers_are_parsed() {
        let uri: Uri = "http://example.com/".parse().unwrap();
        let request = build_request(
            &cli(&["-H", "X-Trace:  on", "-A", "probe/1", "http://example.com/"]),
            &uri,
            false,
        )
        .unwrap();
        assert_eq!(request.headers()["x-trace"], "on");
        assert_eq!(request.headers()[USER_AGENT], "probe/1");

        assert!(build_request(&cli(&["-H", "broken", "http://example.com/"]), &uri, false).is_err());
    }

    #[test]
    fn style_follows_flags() {
        assert_eq!(report_style(&cli(&["http://a/"])), ReportStyle::Verbose);
        assert_eq!(report_style(&cli(&["--compact", "http://a/"])), ReportStyle::Compact);
        assert_eq!(report_style(&cli(&["--json", "http://a/"])), ReportStyle::Json);
    }

    #[test]
    fn only_real_redirects_are_followed() {
        assert!(is_followable(StatusCode::FOUND));
        assert!(is_followable(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_followable(StatusCode::NOT_MODIFIED));
        assert!(!is_followable(StatusCode::OK));
    }

    #[test]
    fn see_other_and_post_redirects_switch_to_get() {
        assert!(redirect_drops_body(StatusCode::SEE_OTHER, &Method::POST));
        assert!(redirect_drops_body(StatusCode::SEE_OTHER, &Method::PUT));
        assert!(!redirect_drops_body(StatusCode::SEE_OTHER, &Method::HEAD));
        assert!(redirect_drops_body(StatusCode::FOUND, &Method::POST));
        assert!(redirect_drops_body(StatusCode::MOVED_PERMANENTLY, &Method::POST));
        assert!(!redirect_drops_body(StatusCode::FOUND, &Method::PUT));
        assert!(!redirect_drops_body(StatusCode::TEMPORARY_REDIRECT, &Method::POST));
        assert!(!redirect_drops_body(StatusCode::PERMANENT_REDIRECT, &Method::POST));
    }

    #[test]
    fn redirected_hop_is_a_bodyless_get() {
        let uri: Uri = "http://example.com/next".parse().unwrap();
        let request = build_request(
            &cli(&["-X", "PUT", "-d", "a=b", "-H", "X-Trace: on", "http://example.com/"]),
            &uri,
            true,
        )
        .unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert!(request.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(request.headers()["x-trace"], "on");
        assert_eq!(request.body().size_hint().exact(), Some(0));
    }
}
