use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use serde_json;
use parenmaren_protocol::{random_room_code, ClientToServer, RoomSnapshot, ServerToClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🎲 Paren Maren CLI Client");
    println!("=========================");

    // Get player name
    print!("Enter your name: ");
    io::stdout().flush()?;
    let mut player_name = String::new();
    io::stdin().read_line(&mut player_name)?;
    let player_name = player_name.trim().to_string();

    if player_name.is_empty() {
        println!("❌ Name cannot be empty");
        return Ok(());
    }

    // Get room code (empty = create a fresh one)
    print!("Enter room code (blank for a new room): ");
    io::stdout().flush()?;
    let mut room_code = String::new();
    io::stdin().read_line(&mut room_code)?;
    let mut room_code = room_code.trim().to_uppercase();
    if room_code.is_empty() {
        room_code = random_room_code();
        println!("🏠 New room code: {}", room_code);
    }

    // Connect to server
    let port = std::env::var("PORT").unwrap_or_else(|_| "9001".to_string());
    let url = format!("ws://127.0.0.1:{}/ws", port);
    println!("🔗 Connecting to {}...", url);

    let (ws_stream, _) = connect_async(&url).await?;
    println!("✅ Connected to server!");

    let (mut write, mut read) = ws_stream.split();

    // The name doubles as the player identifier, so reconnecting under
    // the same name resumes the same seat and score.
    let join_msg = ClientToServer::Join {
        room: room_code.clone(),
        player_id: player_name.clone(),
        name: player_name.clone(),
        create_if_missing: true,
    };

    let join_json = serde_json::to_string(&join_msg)?;
    write.send(Message::Text(join_json)).await?;

    println!("🚪 Joining room '{}'...", room_code);

    // Handle incoming messages
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(server_msg) = serde_json::from_str::<ServerToClient>(&text) {
                        handle_server_message(server_msg);
                    }
                }
                Ok(Message::Close(_)) => {
                    println!("🔌 Connection closed by server");
                    break;
                }
                Err(e) => {
                    println!("❌ WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    println!("\n📋 Commands available:");
    println!("  start       - Start the game (host only)");
    println!("  roll        - Roll a die");
    println!("  pm          - Paren Maren! Roll the black multiplier die");
    println!("  end         - End your turn and bank the score");
    println!("  leave       - Leave the room");
    println!("  quit        - Exit");
    println!("\nType commands and press Enter:");

    // Handle user input
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();

        if line == "quit" {
            break;
        }

        if let Some(msg) = parse_command(line) {
            let json = serde_json::to_string(&msg)?;
            write.send(Message::Text(json)).await?;
        } else {
            println!("❓ Unknown command: {}", line);
        }
    }

    println!("👋 Goodbye!");
    Ok(())
}

fn handle_server_message(msg: ServerToClient) {
    match msg {
        ServerToClient::Hello { your_id } => {
            println!("👋 Welcome! Connection id: {}", your_id);
        }
        ServerToClient::Joined { snapshot } => {
            println!("🎯 Joined room {}", snapshot.id);
            print_game_state(&snapshot);
        }
        ServerToClient::RoomUpdated { snapshot } => {
            print_game_state(&snapshot);
        }
        ServerToClient::RoomDeleted => {
            println!("🏚️  Room deleted (everyone left)");
        }
        ServerToClient::Rolled { last, dice, can_paren_maren } => {
            println!("🎲 You rolled a {} (turn so far: {:?})", last, dice);
            if can_paren_maren {
                println!("⚡ Paren Maren available! Type 'pm' to roll the multiplier");
            }
        }
        ServerToClient::ParenMaren { multiplier, .. } => {
            println!("⬛ Black die landed on {} — your turn scores x{}", multiplier, multiplier);
        }
        ServerToClient::TurnEnded { gained, score } => {
            println!("🏁 Turn over: +{} points, total {}", gained, score);
        }
        ServerToClient::Error { message } => {
            println!("❌ Error: {}", message);
        }
        ServerToClient::Info { message } => {
            println!("ℹ️  {}", message);
        }
    }
}

fn print_game_state(snapshot: &RoomSnapshot) {
    println!("\n🎲 === ROOM {} ===", snapshot.id);
    println!("🕹️  Phase: {}", snapshot.phase);
    if let Some(winner) = &snapshot.winner {
        println!("🏆 Winner: {}", winner);
    }
    if !snapshot.dice.is_empty() {
        println!("🎰 Dice this turn: {:?} (x{})", snapshot.dice, snapshot.multiplier);
    }

    println!("👥 Players ({}):", snapshot.players.len());
    for (i, player) in snapshot.players.iter().enumerate() {
        let to_act = if i == snapshot.turn_index { " 👈 TO ACT" } else { "" };
        let host = if snapshot.host_id.as_deref() == Some(player.id.as_str()) {
            " 🎩 HOST"
        } else {
            ""
        };
        let offline = if player.connected { "" } else { " [OFFLINE]" };

        println!(
            "  {}: {} ({} points){}{}{}",
            i, player.name, player.score, offline, to_act, host
        );
    }
    println!("==================\n");
}

fn parse_command(input: &str) -> Option<ClientToServer> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    match parts[0].to_lowercase().as_str() {
        "start" => Some(ClientToServer::StartGame),
        "roll" => Some(ClientToServer::RollDice { faces: None }),
        "pm" | "parenmaren" => Some(ClientToServer::RollParenMaren { faces: None }),
        "end" => Some(ClientToServer::EndTurn),
        "leave" => Some(ClientToServer::Leave),
        _ => None,
    }
}
