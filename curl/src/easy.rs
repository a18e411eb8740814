use cirro_http::{Method, Request, ResponseError, ResponseErrorKind, RuntimeOptions};
use curl::{
    easy::{Easy2, Handler, HttpVersion, List},
    Error as CurlError, Version,
};
use log::warn;
use once_cell::sync::Lazy;

static BASE_USER_AGENT: Lazy<Box<str>> = Lazy::new(|| {
    format!(
        "CirroRust/cirro-curl-{}/libcurl-{}",
        env!("CARGO_PKG_VERSION"),
        Version::get().version()
    )
    .into()
});

pub(crate) fn user_agent(appended: Option<&str>) -> String {
    let mut user_agent = BASE_USER_AGENT.to_string();
    if let Some(appended) = appended {
        user_agent.push_str(appended);
    }
    user_agent
}

pub(crate) fn set_method<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    let method = request.method();
    if method == Method::GET {
        handle(easy.get(true))
    } else if method == Method::HEAD {
        handle(easy.nobody(true))
    } else if method == Method::POST {
        handle(easy.post(true))
    } else if method == Method::PUT {
        handle(easy.upload(true))
    } else {
        handle(easy.custom_request(method.as_str()))
    }
}

#[inline]
pub(crate) fn set_url<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    handle(easy.url(&request.url().to_string()))
}

pub(crate) fn set_headers<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
) -> Result<(), ResponseError> {
    let mut header_list = List::new();
    handle(header_list.append("Expect:"))?;
    for (header_name, header_value) in request.headers().iter() {
        let line = format!(
            "{}: {}",
            header_name.as_str(),
            String::from_utf8_lossy(header_value.as_bytes())
        );
        handle(header_list.append(&line))?;
    }
    handle(easy.http_headers(header_list))?;
    Ok(())
}

pub(crate) fn set_body<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
    body_size: u64,
) -> Result<(), ResponseError> {
    if body_size > 0 {
        if request.method() == Method::PUT {
            handle(easy.in_filesize(body_size))?;
        } else {
            handle(easy.post_field_size(body_size))?;
        }
    }
    Ok(())
}

pub(crate) fn set_options<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
    options: &RuntimeOptions,
    appended_user_agent: Option<&str>,
) -> Result<(), ResponseError> {
    handle(easy.useragent(&user_agent(appended_user_agent)))?;
    handle(easy.accept_encoding(""))?;
    handle(easy.http_version(HttpVersion::Any))?;
    handle(easy.show_header(false))?;
    handle(easy.signal(false))?;
    handle(easy.progress(false))?;
    handle(easy.transfer_encoding(true))?;

    handle(easy.connect_timeout(options.effective_connect_timeout()))?;
    if let Some(read_timeout) = options.read_timeout().filter(|timeout| !timeout.is_zero()) {
        handle(easy.timeout(read_timeout))?;
    }

    let ignore_ssl = options.ignore_ssl().unwrap_or(false);
    handle(easy.ssl_verify_peer(!ignore_ssl))?;
    handle(easy.ssl_verify_host(!ignore_ssl))?;
    if let Some(ca) = options.ca() {
        handle(easy.cainfo(ca))?;
    }
    if let Some(cert) = options.cert() {
        handle(easy.ssl_cert(cert))?;
    }
    if let Some(key) = options.key() {
        handle(easy.ssl_key(key))?;
    }

    set_proxy(easy, request, options)?;
    if let Some(no_proxy) = options.no_proxy() {
        handle(easy.noproxy(no_proxy))?;
    }

    if let Some(local_addr) = options.local_addr() {
        handle(easy.interface(local_addr))?;
    }
    if let Some(max_idle_conns) = options.max_idle_conns() {
        handle(easy.max_connects(max_idle_conns.try_into().unwrap_or(u32::MAX)))?;
    }

    let keep_alive = options.keep_alive().unwrap_or(true);
    handle(easy.tcp_keepalive(keep_alive))?;
    if !keep_alive {
        handle(easy.forbid_reuse(true))?;
    }
    Ok(())
}

fn set_proxy<H: Handler>(
    easy: &mut Easy2<H>,
    request: &Request,
    options: &RuntimeOptions,
) -> Result<(), ResponseError> {
    if let Some(socks5_proxy) = options.socks5_proxy() {
        if options
            .socks5_net_work()
            .map_or(false, |net_work| net_work.eq_ignore_ascii_case("udp"))
        {
            warn!("socks5 over udp is not supported by the transport, falling back to tcp");
        }
        let proxy_url = if socks5_proxy.contains("://") {
            socks5_proxy.to_owned()
        } else {
            format!("socks5://{}", socks5_proxy)
        };
        return handle(easy.proxy(&proxy_url));
    }
    let proxy = match request.url().scheme_str() {
        Some("https") => options.https_proxy(),
        _ => options.http_proxy(),
    };
    if let Some(proxy) = proxy {
        handle(easy.proxy(proxy))?;
    }
    Ok(())
}

pub(crate) fn handle<T>(result: Result<T, CurlError>) -> Result<T, ResponseError> {
    result.map_err(map_curl_error)
}

pub(crate) fn map_curl_error(err: CurlError) -> ResponseError {
    if err.is_unsupported_protocol()
        || err.is_bad_content_encoding()
        || err.is_filesize_exceeded()
        || err.is_http2_error()
        || err.is_http2_stream_error()
    {
        ResponseError::new(ResponseErrorKind::ProtocolError, err)
    } else if err.is_url_malformed() {
        ResponseError::new(ResponseErrorKind::InvalidUrl, err)
    } else if err.is_couldnt_resolve_proxy() {
        ResponseError::new(ResponseErrorKind::ProxyError, err)
    } else if err.is_couldnt_resolve_host() {
        ResponseError::new(ResponseErrorKind::UnknownHostError, err)
    } else if err.is_couldnt_connect() {
        ResponseError::new(ResponseErrorKind::ConnectError, err)
    } else if err.is_send_error() {
        ResponseError::new(ResponseErrorKind::SendError, err)
    } else if err.is_recv_error() {
        ResponseError::new(ResponseErrorKind::ReceiveError, err)
    } else if err.is_read_error() || err.is_write_error() || err.is_send_fail_rewind() {
        ResponseError::new(ResponseErrorKind::LocalIoError, err)
    } else if err.is_aborted_by_callback() {
        ResponseError::new(ResponseErrorKind::UserCanceled, err)
    } else if err.is_operation_timedout() {
        ResponseError::new(ResponseErrorKind::TimeoutError, err)
    } else if err.is_too_many_redirects() {
        ResponseError::new(ResponseErrorKind::TooManyRedirect, err)
    } else if err.is_ssl_connect_error()
        || err.is_peer_failed_verification()
        || err.is_ssl_engine_initfailed()
        || err.is_ssl_engine_notfound()
        || err.is_ssl_engine_setfailed()
        || err.is_ssl_certproblem()
        || err.is_ssl_cipher()
        || err.is_use_ssl_failed()
        || err.is_ssl_cacert()
        || err.is_ssl_cacert_badfile()
        || err.is_ssl_crl_badfile()
        || err.is_ssl_shutdown_failed()
        || err.is_ssl_issuer_error()
    {
        ResponseError::new(ResponseErrorKind::SslError, err)
    } else {
        ResponseError::new(ResponseErrorKind::UnknownError, err)
    }
}
