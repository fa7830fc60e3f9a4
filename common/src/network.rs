use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::{Bet, BetId, BetView, Outcome, Record, User, UserId};

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub enum Request {
    Register { user_id: UserId, display_name: String }, // None response
    Login { user_id: UserId },
    WhoAmI,
    ListUsers,
    GetRecord { user_id: UserId },
    CreateBet { participant_id: UserId, description: String, pride_wagered: u32 },
    ListBets,
    RespondToBet { bet_id: BetId, accept: bool },
    SettleBet { bet_id: BetId, outcome: Outcome },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum Response {
    None,
    SuccessfulLogin(User),
    WhoAmI(User),
    Users(Vec<User>),
    Record(Record),
    Bet(Bet),
    Bets(Vec<BetView>),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorCode {
    NotAuthenticated,
    InvalidInput,
    NotFound,
    InvalidTransition,
    StoreUnavailable,
    BadRequest,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum Packet {
    RequestPacket(Request),
    ResponsePacket(Response),
    Error { code: ErrorCode, message: String },
}

impl Packet {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Packet::Error {
            code,
            message: message.into(),
        }
    }
}

pub struct Connection {
    connection: tungstenite_socket::TungsteniteWebSocket,
}

impl Connection {
    pub async fn from_tcp_stream(connection: TcpStream) -> anyhow::Result<Self> {
        let ws = tungstenite_socket::TungsteniteWebSocket::new(connection).await?;

        Ok(Self { connection: ws })
    }

    /// Returns `Ok(None)` once the peer has closed the socket.
    pub async fn read(&mut self) -> anyhow::Result<Option<Packet>> {
        match self.connection.read().await? {
            Some(data) => Ok(Some(rmp_serde::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn send(&mut self, data: Packet) -> anyhow::Result<()> {
        self.connection.write_all(&encode(&data)?).await
    }
}

pub fn encode(packet: &Packet) -> anyhow::Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(packet)?)
}

pub fn decode(data: &[u8]) -> anyhow::Result<Packet> {
    Ok(rmp_serde::from_slice(data)?)
}

mod tungstenite_socket {
    use anyhow::bail;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;

    pub struct TungsteniteWebSocket {
        socket: tokio_tungstenite::WebSocketStream<TcpStream>,
    }

    impl TungsteniteWebSocket {
        pub async fn new(stream: TcpStream) -> anyhow::Result<Self> {
            let ws_stream = tokio_tungstenite::accept_async(stream).await?;
            Ok(Self { socket: ws_stream })
        }

        pub async fn read(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
            loop {
                let Some(message) = self.socket.next().await else {
                    return Ok(None);
                };
                match message? {
                    Message::Binary(data) => return Ok(Some(data)),
                    Message::Close(_) => return Ok(None),
                    // tungstenite answers pings itself
                    Message::Ping(_) | Message::Pong(_) => continue,
                    _ => bail!("incorrect data type received"),
                }
            }
        }

        pub async fn write_all(&mut self, buf: &[u8]) -> anyhow::Result<()> {
            Ok(self.socket.send(Message::Binary(buf.to_vec())).await?)
        }
    }
}
