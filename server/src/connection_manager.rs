use anyhow::{bail, Result};
use common::network::{Connection, ErrorCode, Packet, Request, Response};
use common::User;
use surrealdb::Connection as DbConnection;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::database::DatabaseConnection;
use crate::error::LedgerError;
use crate::ledger::{BetLedger, RecordBacklog};
use crate::store::{BetStore, UserDirectory};

pub async fn handle_listen_server<C: DbConnection>(
    listener: TcpListener,
    database: DatabaseConnection<C>,
    backlog: RecordBacklog,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!("accept failed: {}", error);
                continue;
            }
        };
        let database = database.clone();
        let backlog = backlog.clone();

        tokio::spawn(async move {
            debug!(%peer, "connection accepted");
            let connection = match Connection::from_tcp_stream(stream).await {
                Ok(connection) => connection,
                Err(error) => {
                    warn!(%peer, "websocket handshake failed: {:#}", error);
                    return;
                }
            };
            match handle_connection(connection, database, backlog).await {
                Ok(()) => debug!(%peer, "connection closed"),
                Err(error) => warn!(%peer, "connection ended: {:#}", error),
            }
        });
    }
}

async fn handle_connection<C: DbConnection>(
    mut connection: Connection,
    database: DatabaseConnection<C>,
    backlog: RecordBacklog,
) -> Result<()> {
    let anonymous =
        BetLedger::with_backlog(database.clone(), database.session(None), backlog.clone());
    let Some(user) = handle_login(&mut connection, &anonymous).await? else {
        return Ok(());
    };

    let ledger = BetLedger::with_backlog(database.clone(), database.session(Some(user.id)), backlog);
    handle_client(&mut connection, &ledger).await
}

/// Serves `Register`/`Login` until a login succeeds. `None` if the client left first.
async fn handle_login<S: BetStore, D: UserDirectory>(
    connection: &mut Connection,
    ledger: &BetLedger<S, D>,
) -> Result<Option<User>> {
    loop {
        let Some(packet) = connection.read().await? else {
            return Ok(None);
        };
        let request = match packet {
            Packet::RequestPacket(request) => request,
            other => bail!("invalid packet at login: {:?}", other),
        };
        match dispatch_login(ledger, request).await {
            LoginStep::LoggedIn(user) => {
                connection
                    .send(Packet::ResponsePacket(Response::SuccessfulLogin(user.clone())))
                    .await?;
                return Ok(Some(user));
            }
            LoginStep::Reply(reply) => connection.send(reply).await?,
        }
    }
}

async fn handle_client<S: BetStore, D: UserDirectory>(
    connection: &mut Connection,
    ledger: &BetLedger<S, D>,
) -> Result<()> {
    loop {
        let Some(packet) = connection.read().await? else {
            return Ok(());
        };
        match packet {
            Packet::RequestPacket(Request::Login { .. }) => {
                warn!("duplicate login detected");
                connection
                    .send(Packet::error(ErrorCode::BadRequest, "already signed in"))
                    .await?;
                bail!("attempted re-login - denied");
            }
            Packet::RequestPacket(request) => {
                let reply = dispatch(ledger, request).await;
                connection.send(reply).await?;
            }
            other => bail!("incorrect packet type: {:?}", other),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum LoginStep {
    LoggedIn(User),
    Reply(Packet),
}

fn reply(result: std::result::Result<Response, LedgerError>) -> Packet {
    match result {
        Ok(response) => Packet::ResponsePacket(response),
        Err(error) => {
            debug!(code = ?error.code(), "request failed: {}", error);
            Packet::error(error.code(), error.to_string())
        }
    }
}

pub async fn dispatch_login<S: BetStore, D: UserDirectory>(
    ledger: &BetLedger<S, D>,
    request: Request,
) -> LoginStep {
    match request {
        Request::Register {
            user_id,
            display_name,
        } => LoginStep::Reply(reply(
            ledger
                .register_user(&user_id, &display_name)
                .await
                .map(|_| Response::None),
        )),
        Request::Login { user_id } => {
            match ledger.directory().get_user(&user_id).await {
                Ok(Some(user)) => {
                    info!(user_id = %user.id, "user logged in");
                    LoginStep::LoggedIn(user)
                }
                Ok(None) => LoginStep::Reply(reply(Err(LedgerError::not_found("user", user_id)))),
                Err(error) => LoginStep::Reply(reply(Err(LedgerError::store(error)))),
            }
        }
        _ => LoginStep::Reply(reply(Err(LedgerError::NotAuthenticated))),
    }
}

/// Answers one request on behalf of the signed in user of `ledger`.
pub async fn dispatch<S: BetStore, D: UserDirectory>(
    ledger: &BetLedger<S, D>,
    request: Request,
) -> Packet {
    let Some(caller) = ledger.directory().current_user_id() else {
        return reply(Err(LedgerError::NotAuthenticated));
    };

    let result = match request {
        Request::Register { .. } | Request::Login { .. } => {
            return Packet::error(ErrorCode::BadRequest, "already signed in");
        }
        Request::WhoAmI => ledger.current_user().await.map(Response::WhoAmI),
        Request::ListUsers => ledger.list_users().await.map(Response::Users),
        Request::GetRecord { user_id } => ledger.record_for(&user_id).await.map(Response::Record),
        Request::CreateBet {
            participant_id,
            description,
            pride_wagered,
        } => ledger
            .create_bet(&caller, &participant_id, &description, pride_wagered)
            .await
            .map(Response::Bet),
        Request::ListBets => ledger.list_bets_for_user(&caller).await.map(Response::Bets),
        Request::RespondToBet { bet_id, accept } => ledger
            .respond_to_bet(&bet_id, &caller, accept)
            .await
            .map(Response::Bet),
        Request::SettleBet { bet_id, outcome } => ledger
            .settle_bet(&bet_id, &caller, outcome)
            .await
            .map(Response::Bet),
    };
    reply(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, MemorySession};
    use common::{BetStatus, Outcome};

    fn backend() -> MemoryBackend {
        MemoryBackend::with_users(&[("alice", "Alice"), ("bob", "Bob")])
    }

    fn ledger_for(backend: &MemoryBackend, user: Option<&str>) -> BetLedger<MemoryBackend, MemorySession> {
        BetLedger::new(backend.clone(), backend.session(user))
    }

    fn error_code(packet: &Packet) -> Option<ErrorCode> {
        match packet {
            Packet::Error { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[tokio::test]
    async fn login_phase_only_accepts_register_and_login() {
        let backend = backend();
        let anonymous = ledger_for(&backend, None);

        match dispatch_login(&anonymous, Request::ListBets).await {
            LoginStep::Reply(packet) => assert_eq!(error_code(&packet), Some(ErrorCode::NotAuthenticated)),
            other => panic!("unexpected {:?}", other),
        }
        match dispatch_login(&anonymous, Request::Login { user_id: "dave".into() }).await {
            LoginStep::Reply(packet) => assert_eq!(error_code(&packet), Some(ErrorCode::NotFound)),
            other => panic!("unexpected {:?}", other),
        }

        let registered = dispatch_login(
            &anonymous,
            Request::Register {
                user_id: "dave".into(),
                display_name: "Dave".into(),
            },
        )
        .await;
        assert_eq!(registered, LoginStep::Reply(Packet::ResponsePacket(Response::None)));

        match dispatch_login(&anonymous, Request::Login { user_id: "dave".into() }).await {
            LoginStep::LoggedIn(user) => assert_eq!(user.display_name, "Dave"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn bet_lifecycle_over_requests() {
        let backend = backend();
        let alice = ledger_for(&backend, Some("alice"));
        let bob = ledger_for(&backend, Some("bob"));

        let created = dispatch(
            &alice,
            Request::CreateBet {
                participant_id: "bob".into(),
                description: "Coin flip".into(),
                pride_wagered: 10,
            },
        )
        .await;
        let Packet::ResponsePacket(Response::Bet(bet)) = created else {
            panic!("unexpected {:?}", created);
        };
        assert_eq!(bet.creator_id, "alice");

        let Packet::ResponsePacket(Response::Bets(views)) = dispatch(&bob, Request::ListBets).await else {
            panic!("bob should see the bet");
        };
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status_display, "Needs Your Response");

        let early = dispatch(
            &alice,
            Request::SettleBet {
                bet_id: bet.id.clone(),
                outcome: Outcome::CreatorWon,
            },
        )
        .await;
        assert_eq!(error_code(&early), Some(ErrorCode::InvalidTransition));

        let accepted = dispatch(
            &bob,
            Request::RespondToBet {
                bet_id: bet.id.clone(),
                accept: true,
            },
        )
        .await;
        assert!(matches!(
            accepted,
            Packet::ResponsePacket(Response::Bet(ref b)) if b.status == BetStatus::Accepted
        ));

        let settled = dispatch(
            &alice,
            Request::SettleBet {
                bet_id: bet.id.clone(),
                outcome: Outcome::Draw,
            },
        )
        .await;
        assert!(matches!(
            settled,
            Packet::ResponsePacket(Response::Bet(ref b)) if b.is_draw()
        ));

        let record = dispatch(&alice, Request::GetRecord { user_id: "bob".into() }).await;
        assert!(matches!(
            record,
            Packet::ResponsePacket(Response::Record(r)) if r.draws == 1 && r.pride_balance == 0
        ));
    }

    #[tokio::test]
    async fn signed_in_session_refuses_second_login() {
        let backend = backend();
        let alice = ledger_for(&backend, Some("alice"));
        let packet = dispatch(&alice, Request::Login { user_id: "bob".into() }).await;
        assert_eq!(error_code(&packet), Some(ErrorCode::BadRequest));

        let Packet::ResponsePacket(Response::WhoAmI(me)) = dispatch(&alice, Request::WhoAmI).await else {
            panic!("who am i failed");
        };
        assert_eq!(me.id, "alice");

        let Packet::ResponsePacket(Response::Users(users)) = dispatch(&alice, Request::ListUsers).await else {
            panic!("list users failed");
        };
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn errors_carry_code_and_message() {
        let backend = backend();
        let alice = ledger_for(&backend, Some("alice"));
        let packet = dispatch(
            &alice,
            Request::CreateBet {
                participant_id: "bob".into(),
                description: "".into(),
                pride_wagered: 10,
            },
        )
        .await;
        assert_eq!(
            packet,
            Packet::error(
                ErrorCode::InvalidInput,
                "Invalid input: description must not be empty"
            )
        );
    }
}
