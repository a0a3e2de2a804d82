//! The remote extension RPC server: a length-delimited, `serde_json`-framed
//! request/reply surface plus two streaming surfaces, listening on TCP or a
//! Unix domain socket.

pub mod codec;
pub mod pipe;
pub mod subscription;
pub mod wire;

use std::sync::Arc;

use corvus_interface::Writer;
use corvus_store::model::{Flags, Grant};
use corvus_store::{AuthIdentity, SessionKey, SessionTable, Store, StoredChannel, StoredUser};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio_util::codec::Framed;

use crate::config::Config;
use crate::dispatch::argspec::{ArgFormal, ArgKind};
use crate::dispatch::command::{CommandAction, CommandKind, CommandScope, CommandSpec};
use crate::dispatch::Dispatcher;
use crate::error::RpcError;
use crate::network::Killable;
use crate::rpc::codec::JsonCodec;
use crate::rpc::pipe::{event_pipe_handler, CommandPipe};
use crate::rpc::subscription::SubscriptionTable;
use crate::rpc::wire::{ArgFormalWire, CmdSpecWire, OutFrame, Request, Response, ResponseBody, UserWire};

/// Shared handles the RPC server needs to service requests.
#[derive(Clone)]
pub struct RpcContext {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<Store>,
    pub sessions: Arc<SessionTable>,
    pub subs: Arc<SubscriptionTable>,
}

/// Runs the extension RPC server until `killable` is closed. A no-op if
/// `config.extension_listen` is unset. TLS termination (`tls-native`
/// feature) kicks in when both `config.tls_cert` and `config.tls_key` are
/// set; otherwise connections are plaintext.
pub async fn serve(config: &Config, ctx: RpcContext, killable: Killable) -> Result<(), std::io::Error> {
    let Some(addr) = &config.extension_listen else {
        return Ok(());
    };
    let acceptor = build_acceptor(config)?;

    if let Some(path) = addr.strip_prefix("unix:") {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    accept_connection(stream, ctx.clone(), acceptor.clone());
                }
                _ = killable.wait() => return Ok(()),
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let _ = stream.set_nodelay(true);
                    accept_connection(stream, ctx.clone(), acceptor.clone());
                }
                _ = killable.wait() => return Ok(()),
            }
        }
    }
}

#[cfg(feature = "tls-native")]
type RpcTlsAcceptor = Option<tokio_native_tls::TlsAcceptor>;

#[cfg(not(feature = "tls-native"))]
type RpcTlsAcceptor = Option<()>;

#[cfg(feature = "tls-native")]
fn build_acceptor(config: &Config) -> Result<RpcTlsAcceptor, std::io::Error> {
    let (Some(cert_path), Some(key_path)) = (&config.tls_cert, &config.tls_key) else {
        return Ok(None);
    };
    let cert_pem = std::fs::read(cert_path)?;
    let key_pem = std::fs::read(key_path)?;
    let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let acceptor = native_tls::TlsAcceptor::new(identity)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(Some(tokio_native_tls::TlsAcceptor::from(acceptor)))
}

#[cfg(not(feature = "tls-native"))]
fn build_acceptor(config: &Config) -> Result<RpcTlsAcceptor, std::io::Error> {
    if config.tls_cert.is_some() || config.tls_key.is_some() {
        log::warn!("tls_cert/tls_key set but the tls-native feature is disabled; serving plaintext");
    }
    Ok(None)
}

fn accept_connection<S>(stream: S, ctx: RpcContext, acceptor: RpcTlsAcceptor)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    match acceptor {
        #[cfg(feature = "tls-native")]
        Some(acceptor) => {
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => spawn_connection(tls_stream, ctx),
                    Err(e) => log::debug!("extension TLS handshake failed: {e}"),
                }
            });
        }
        _ => spawn_connection(stream, ctx),
    }
}

fn spawn_connection<S>(stream: S, ctx: RpcContext)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, ctx).await {
            log::debug!("extension connection closed: {e}");
        }
    });
}

async fn handle_connection<S>(stream: S, ctx: RpcContext) -> Result<(), std::io::Error>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let framed: Framed<S, JsonCodec<Request, OutFrame>> = Framed::new(stream, JsonCodec::default());
    let (mut sink, mut stream) = framed.split();

    // Frames pushed asynchronously (stream items from subscriptions opened
    // on this connection) are funneled through this channel so they can be
    // interleaved with unary replies on the same socket.
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutFrame>(128);
    let mut connection_ext: Option<String> = None;

    loop {
        tokio::select! {
            next = stream.next() => {
                match next {
                    Some(Ok(req)) => {
                        if let Request::Events { ext, .. } | Request::Commands { ext, .. } = &req {
                            connection_ext = Some(ext.clone());
                        }
                        let resp = handle_request(&ctx, req, out_tx.clone()).await;
                        if sink.send(OutFrame::Response(resp)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        log::debug!("malformed extension frame: {e}");
                        break;
                    }
                    None => break,
                }
            }
            Some(item) = out_rx.recv() => {
                if sink.send(item).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(ext) = connection_ext {
        ctx.dispatcher.unregister_ext(&ext);
        ctx.subs.remove_ext(&ext);
    }
    Ok(())
}

async fn handle_request(ctx: &RpcContext, req: Request, out_tx: tokio::sync::mpsc::Sender<OutFrame>) -> Response {
    match dispatch_request(ctx, req, out_tx).await {
        Ok(body) => Response::Ok(body),
        Err(e) => Response::Err { status: (&e).into(), message: e.to_string() },
    }
}

async fn dispatch_request(
    ctx: &RpcContext,
    req: Request,
    out_tx: tokio::sync::mpsc::Sender<OutFrame>,
) -> Result<ResponseBody, RpcError> {
    match req {
        Request::Write { network, line } => {
            let writer = ctx
                .dispatcher
                .writer_for(&network)
                .ok_or_else(|| RpcError::InvalidArgument(format!("unknown network {network:?}")))?;
            writer
                .raw(&network, line)
                .map_err(|e| RpcError::Internal(e.to_string()))?;
            Ok(ResponseBody::Unit)
        }

        Request::Register { ext, network, channel, event } => {
            let subs = ctx.subs.clone();
            // The event name itself doubles as the subscription filter key:
            // the pipe handler broadcasts to every subscription filtered on
            // it, and `Events { filter }` is how an extension opens one.
            let event_id = event.clone();
            let id = ctx.dispatcher.register_ext_handler(
                ext,
                network,
                channel,
                Some(event),
                event_pipe_handler(subs, event_id),
            );
            Ok(ResponseBody::Id(id.as_u64()))
        }

        Request::RegisterCmd { ext, network, channel, spec } => {
            let cmd_spec = build_command_spec(&ext, network, channel, spec, ctx.subs.clone())?;
            let id = ctx
                .dispatcher
                .register_command(cmd_spec)
                .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;
            Ok(ResponseBody::Id(id.as_u64()))
        }

        Request::Unregister { ext: _, id } => {
            Ok(ResponseBody::Bool(ctx.dispatcher.unregister_handler(id.into())))
        }

        Request::UnregisterCmd { ext: _, id } => {
            Ok(ResponseBody::Bool(ctx.dispatcher.unregister_command(id.into())))
        }

        Request::UnregisterAll { ext } => {
            ctx.dispatcher.unregister_ext(&ext);
            ctx.subs.remove_ext(&ext);
            Ok(ResponseBody::Unit)
        }

        Request::Events { ext, filter } => {
            let (id, mut rx) = ctx.subs.add(ext, filter);
            tokio::spawn(async move {
                while let Some(item) = rx.recv().await {
                    if out_tx.send(OutFrame::Stream(item)).await.is_err() {
                        break;
                    }
                }
            });
            Ok(ResponseBody::Id(id))
        }

        Request::Commands { ext, filter } => {
            let (id, mut rx) = ctx.subs.add(ext, filter);
            tokio::spawn(async move {
                while let Some(item) = rx.recv().await {
                    if out_tx.send(OutFrame::Stream(item)).await.is_err() {
                        break;
                    }
                }
            });
            Ok(ResponseBody::Id(id))
        }

        Request::FindUser { username } => {
            let user = ctx.store.get_user(&username)?;
            Ok(ResponseBody::User(user.map(to_user_wire)))
        }

        Request::GlobalUsers => {
            let usernames = ctx.store.users_for_global()?;
            Ok(ResponseBody::Users(load_users(&ctx.store, usernames)?))
        }

        Request::NetworkUsers { network } => {
            let usernames = ctx.store.users_for_network(&network)?;
            Ok(ResponseBody::Users(load_users(&ctx.store, usernames)?))
        }

        Request::ChanUsers { network, channel } => {
            let usernames = ctx.store.users_for_channel(&network, &channel)?;
            Ok(ResponseBody::Users(load_users(&ctx.store, usernames)?))
        }

        Request::SaveUser { user } => {
            ctx.store.put_user(&from_user_wire(user))?;
            Ok(ResponseBody::Unit)
        }

        Request::RemoveUser { username } => {
            let existed = ctx.store.delete_user(&username)?;
            ctx.sessions.logout_by_username(&username);
            Ok(ResponseBody::Bool(existed))
        }

        Request::SaveChannel { channel } => {
            ctx.store.put_channel(&StoredChannel {
                network_id: channel.network,
                name: channel.name,
                data: channel.data,
            })?;
            Ok(ResponseBody::Unit)
        }

        Request::RemoveChannel { network, name } => {
            Ok(ResponseBody::Bool(ctx.store.delete_channel(&network, &name)?))
        }

        Request::AuthUserPerma { network, host, username, password } => {
            let user = ctx.store.get_user(&username)?.ok_or(RpcError::NotFound)?;
            if !corvus_store::password::verify_password(&password, &user.password)
                .map_err(|e| RpcError::Internal(e.to_string()))?
            {
                return Err(RpcError::PermissionDenied);
            }
            if !user.masks.iter().any(|m| corvus_proto::mask::mask_match(m, &host)) {
                return Err(RpcError::PermissionDenied);
            }
            ctx.sessions.login(SessionKey::new(network, host), AuthIdentity::Perma(user));
            Ok(ResponseBody::Unit)
        }

        Request::AuthUserTmp { network, host, username } => {
            // No backing store record is checked or required: a temporary
            // identity authenticates the caller's claim to a username
            // without granting any access until a `register`-style
            // operation persists a `StoredUser` for it.
            ctx.sessions.login(SessionKey::new(network, host), AuthIdentity::Tmp { username });
            Ok(ResponseBody::Unit)
        }

        Request::Logout { network, host } => {
            Ok(ResponseBody::Bool(ctx.sessions.logout(&SessionKey::new(network, host))))
        }

        Request::LogoutByUsername { username } => {
            Ok(ResponseBody::Id(ctx.sessions.logout_by_username(&username) as u64))
        }

        Request::IsFirst => Ok(ResponseBody::Bool(ctx.store.is_empty()?)),
    }
}

fn load_users(store: &Store, usernames: std::collections::BTreeSet<String>) -> Result<Vec<UserWire>, RpcError> {
    let mut out = Vec::with_capacity(usernames.len());
    for username in usernames {
        if let Some(u) = store.get_user(&username)? {
            out.push(to_user_wire(u));
        }
    }
    Ok(out)
}

fn to_user_wire(u: StoredUser) -> UserWire {
    UserWire {
        username: u.username,
        password: u.password,
        masks: u.masks,
        access: u
            .access
            .into_iter()
            .map(|(scope, grant)| (scope, (grant.level, grant.flags.to_string())))
            .collect(),
        data: u.data,
    }
}

fn from_user_wire(w: UserWire) -> StoredUser {
    StoredUser {
        username: w.username,
        password: w.password,
        masks: w.masks,
        access: w
            .access
            .into_iter()
            .map(|(scope, (level, flags))| (scope, Grant { level, flags: Flags::parse(&flags) }))
            .collect(),
        data: w.data,
    }
}

fn build_command_spec(
    ext: &str,
    network: Option<String>,
    channel: Option<String>,
    wire: CmdSpecWire,
    subs: Arc<SubscriptionTable>,
) -> Result<CommandSpec, RpcError> {
    let kind = match wire.kind.as_str() {
        "privmsg" => CommandKind::Privmsg,
        "notice" => CommandKind::Notice,
        "all" => CommandKind::All,
        other => return Err(RpcError::InvalidArgument(format!("unknown command kind {other:?}"))),
    };
    let scope = match wire.scope.as_str() {
        "private" => CommandScope::Private,
        "public" => CommandScope::Public,
        "all" => CommandScope::All,
        other => return Err(RpcError::InvalidArgument(format!("unknown command scope {other:?}"))),
    };
    let args = wire
        .args
        .into_iter()
        .map(to_arg_formal)
        .collect::<Result<Vec<ArgFormal>, RpcError>>()?;

    let cmd_id = format!("{ext}:{}", wire.name);
    Ok(CommandSpec {
        name: wire.name,
        network,
        channel,
        ext: ext.to_owned(),
        desc: wire.desc,
        kind,
        scope,
        args,
        require_auth: wire.require_auth,
        req_level: wire.req_level,
        req_flags: wire.req_flags,
        action: CommandAction::Pipe(Arc::new(CommandPipe::new(subs, cmd_id))),
    })
}

fn to_arg_formal(wire: ArgFormalWire) -> Result<ArgFormal, RpcError> {
    let kind = match wire.kind.as_str() {
        "channel" => ArgKind::Channel,
        "required" => ArgKind::Required,
        "optional" => ArgKind::Optional,
        "variadic" => ArgKind::Variadic,
        "stored_user" => ArgKind::StoredUser,
        "live_user" => ArgKind::LiveUser,
        other => return Err(RpcError::InvalidArgument(format!("unknown arg kind {other:?}"))),
    };
    Ok(ArgFormal { name: wire.name, kind })
}
