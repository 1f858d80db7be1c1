//! Minimal Vite + React scaffold pushed into a fresh sandbox.

use super::provider::SandboxFile;

/// Dependency install step run before the dev server starts.
pub const INSTALL_COMMAND: &str = "npm install";

/// Command that starts the dev server in the background.
pub fn dev_server_command(port: u16) -> String {
    format!("npm run dev -- --host 0.0.0.0 --port {}", port)
}

/// Host part of a public URL, used for HMR websocket routing.
fn public_host(public_url: &str) -> &str {
    let without_scheme = public_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(public_url);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme)
}

fn vite_config(port: u16, public_url: &str) -> String {
    let hmr = if public_url.starts_with("https://") {
        format!(
            "\n    hmr: {{ host: '{}', protocol: 'wss', clientPort: 443 }},",
            public_host(public_url)
        )
    } else {
        String::new()
    };

    format!(
        r#"import {{ defineConfig }} from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({{
  plugins: [react()],
  server: {{
    host: '0.0.0.0',
    port: {port},
    strictPort: true,
    allowedHosts: true,{hmr}
  }},
}})
"#
    )
}

const PACKAGE_JSON: &str = r#"{
  "name": "sandbox-app",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview"
  },
  "dependencies": {
    "react": "^18.3.1",
    "react-dom": "^18.3.1"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.3.1",
    "vite": "^5.4.0"
  }
}
"#;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Sandbox App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const APP_JSX: &str = r#"export default function App() {
  return (
    <main className="placeholder">
      <h1>Sandbox is running</h1>
      <p>Your app will appear here once code is pushed.</p>
    </main>
  )
}
"#;

const INDEX_CSS: &str = r#"body {
  margin: 0;
  font-family: system-ui, sans-serif;
}

.placeholder {
  display: grid;
  place-items: center;
  min-height: 100vh;
}
"#;

/// Files making up the scaffold for a dev server on `port` reachable at
/// `public_url`.
pub fn vite_scaffold(port: u16, public_url: &str) -> Vec<SandboxFile> {
    vec![
        SandboxFile::new("package.json", PACKAGE_JSON),
        SandboxFile::new("vite.config.js", vite_config(port, public_url)),
        SandboxFile::new("index.html", INDEX_HTML),
        SandboxFile::new("src/main.jsx", MAIN_JSX),
        SandboxFile::new("src/App.jsx", APP_JSX),
        SandboxFile::new("src/index.css", INDEX_CSS),
    ]
}
